use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Process-wide bookkeeping of live background tasks.
///
/// The registry is pure diagnostics: tasks add themselves on start and are removed once their
/// exit is confirmed, so anything still listed at process teardown is a leaked or zombie task.
/// It is never consulted for control decisions. One instance is created at startup and handed to
/// every device that may spawn tasks.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, String>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, name: &str) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, name.to_owned());
        id
    }

    pub(crate) fn deregister(&self, id: u64) {
        self.lock().remove(&id);
    }

    /// Names of every task that was started but never confirmed stopped, sorted.
    pub fn live_tasks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().values().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, String>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

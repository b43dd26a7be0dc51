//! Cancellable background tasks with a bounded-wait shutdown protocol.
//!
//! A `GpioThread` runs a repeating procedure on its own OS thread. The procedure is handed an
//! [`Event`] and is expected to poll it between pin writes; `stop` raises that event and then
//! waits a bounded amount of time for the thread to confirm its exit. A thread that keeps running
//! past its grace period is reported as a [`TaskError::ZombieTask`] and stays in the live-task
//! registry so it can be diagnosed at process teardown.

use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;

pub mod registry;

use registry::TaskRegistry;

/// Enum representing possible failures when managing a background task.
///
/// `ZombieTask` is the fatal one: the worker thread did not confirm its exit within the grace
/// period given to `stop`. It is never retried here - the task stays registered as live and the
/// caller decides what to do with a thread that ignores cancellation (usually one stuck in a
/// blocking driver call).
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("task failed to die within {0:?}")]
    ZombieTask(Duration),
    #[error("task has already been started")]
    AlreadyStarted,
    #[error("task has not been started")]
    NotStarted,
    #[error("failed to spawn worker thread")]
    SpawnFailed(#[source] io::Error),
}

/// A flag threads can set, clear and wait on with a timeout.
///
/// This is the only synchronisation primitive shared between a controller and its worker thread.
/// The worker polls it via [`Event::wait`] between pin writes; the controller raises it via
/// [`Event::set`] to request cancellation.
#[derive(Debug)]
pub struct Event {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self {
            flag: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Raises the flag and wakes every thread currently blocked in [`Event::wait`].
    pub fn set(&self) {
        *self.lock() = true;
        self.cond.notify_all();
    }

    pub fn clear(&self) {
        *self.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.lock()
    }

    /// Blocks until the flag is raised or `timeout` elapses, whichever comes first.
    ///
    /// Returns `true` when the flag was raised. A flag raised before the call returns
    /// immediately.
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |raised| !*raised)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    // Unbounded variant, reserved for joining a worker that is known to terminate on its own.
    pub(crate) fn wait_forever(&self) {
        let mut guard = self.lock();
        while !*guard {
            guard = self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, bool> {
        // A poisoned flag mutex only means a waiter panicked; the flag itself stays valid.
        self.flag.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle state of a [`GpioThread`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskState {
    Idle,
    Running,
    StopRequested,
    Stopped,
    Zombie,
}

/// A named worker thread running a cancellable repeating procedure.
///
/// The target procedure receives the task's cancellation [`Event`] and must poll it between units
/// of work. Starting a task registers it in the supplied [`TaskRegistry`]; it is deregistered
/// only once `stop` (or the crate-internal join) has confirmed the thread exited. A task that was
/// fully stopped can be started again.
pub struct GpioThread {
    name: String,
    stopping: Arc<Event>,
    finished: Arc<Event>,
    target: Arc<dyn Fn(&Event) + Send + Sync + 'static>,
    handle: Option<JoinHandle<()>>,
    registry: Arc<TaskRegistry>,
    registry_id: Option<u64>,
    state: TaskState,
}

impl GpioThread {
    pub fn new<N, F>(name: N, registry: Arc<TaskRegistry>, target: F) -> Self
    where
        N: Into<String>,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            stopping: Arc::new(Event::new()),
            finished: Arc::new(Event::new()),
            target: Arc::new(target),
            handle: None,
            registry,
            registry_id: None,
            state: TaskState::Idle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Spawns the worker thread and registers the task as live.
    ///
    /// Legal only for a task that was never started or was fully stopped since.
    pub fn start(&mut self) -> Result<(), TaskError> {
        use TaskState::*;

        match self.state {
            Idle | Stopped => {}
            Running | StopRequested | Zombie => return Err(TaskError::AlreadyStarted),
        }

        self.stopping.clear();
        self.finished.clear();
        self.registry_id = Some(self.registry.register(&self.name));

        let stopping = Arc::clone(&self.stopping);
        let finished = Arc::clone(&self.finished);
        let target = Arc::clone(&self.target);

        let spawned = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                // The finished latch must be set even when the target panics, or joiners would
                // block forever on a thread that is already gone.
                struct SetOnExit(Arc<Event>);
                impl Drop for SetOnExit {
                    fn drop(&mut self) {
                        self.0.set();
                    }
                }

                let _latch = SetOnExit(finished);
                (target.as_ref())(&stopping);
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = Running;
                debug!("task {} started", self.name);
                Ok(())
            }
            Err(err) => {
                if let Some(id) = self.registry_id.take() {
                    self.registry.deregister(id);
                }
                Err(TaskError::SpawnFailed(err))
            }
        }
    }

    /// Raises the cancellation signal and waits up to `timeout` for the worker to exit.
    ///
    /// On confirmed exit the task is deregistered and can be started again. When the worker is
    /// still alive after `timeout` the task transitions to [`TaskState::Zombie`], stays
    /// registered and [`TaskError::ZombieTask`] is returned; a later `stop` may still confirm the
    /// exit if the worker eventually dies.
    pub fn stop(&mut self, timeout: Duration) -> Result<(), TaskError> {
        use TaskState::*;

        debug_assert!(timeout > Duration::ZERO);

        match self.state {
            Idle => return Err(TaskError::NotStarted),
            Stopped => return Ok(()),
            Running | StopRequested | Zombie => {}
        }

        self.stopping.set();
        self.state = StopRequested;

        if self.finished.wait(timeout) {
            self.reap();
            Ok(())
        } else {
            self.state = Zombie;
            warn!("task {} failed to die within {:?}", self.name, timeout);
            Err(TaskError::ZombieTask(timeout))
        }
    }

    // Waits without a timeout for the worker to finish on its own. Only used when the caller
    // explicitly asked for synchronous completion of a finite procedure.
    pub(crate) fn join(&mut self) -> Result<(), TaskError> {
        use TaskState::*;

        match self.state {
            Idle => return Err(TaskError::NotStarted),
            Stopped => return Ok(()),
            Running | StopRequested | Zombie => {}
        }

        self.finished.wait_forever();
        self.reap();
        Ok(())
    }

    fn reap(&mut self) {
        // The finished latch is set at this point, so the join below returns promptly.
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("task {} panicked", self.name);
            }
        }
        if let Some(id) = self.registry_id.take() {
            self.registry.deregister(id);
        }
        self.state = TaskState::Stopped;
        debug!("task {} stopped", self.name);
    }
}

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use embedded_hal::digital::v2 as eh;
use log::{debug, warn};

use crate::driver::{CfgMode, GpioDriver, Level};
use crate::pin_map::PinId;
use crate::task::registry::TaskRegistry;
use crate::task::{Event, GpioThread};
use crate::{H3GpioError, H3Result};

/// Grace period granted to a running blink task whenever a device operation has to interrupt it.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Parameters of a blink pattern, consumed by [`OutputDevice::blink`].
///
/// The default pattern toggles forever at one second per phase from a background thread. Override
/// individual fields with struct update syntax:
///
/// ```no_run
/// # use h3_blink_gpio::Blink;
/// let three_cycles = Blink { n: Some(3), ..Blink::default() };
/// ```
#[derive(Copy, Clone, Debug)]
pub struct Blink {
    /// Time spent at the active level in each cycle.
    pub on_time: Duration,
    /// Time spent at the inactive level in each cycle.
    pub off_time: Duration,
    /// Number of on/off cycles; `None` means blink forever.
    pub n: Option<u64>,
    /// When `true` (the default) a background thread keeps toggling and the call returns
    /// immediately. When `false` the call only returns once the pattern has run to completion -
    /// with `n` set to `None` it never returns.
    pub background: bool,
}

impl Default for Blink {
    fn default() -> Self {
        Self {
            on_time: Duration::from_secs(1),
            off_time: Duration::from_secs(1),
            n: None,
            background: true,
        }
    }
}

/// A single digital output (typically an LED) with on/off/blink behaviour.
///
/// The device owns its GPIO backend and at most one background blink task at a time; every
/// operation that changes the pin state first stops a task left over from a previous `blink`,
/// waiting up to [`STOP_TIMEOUT`] for it to confirm. A task that outlives that grace period
/// surfaces as [`crate::TaskError::ZombieTask`] through whichever device method had to interrupt
/// it - `on`, `off`, `blink` and `close` can all take that fatal path.
///
/// The logical-to-physical mapping is active-high: logical on drives the pin high.
///
/// Methods take `&mut self`; serializing calls from multiple controlling threads is the caller's
/// job.
pub struct OutputDevice<D: GpioDriver> {
    driver: Arc<Mutex<D>>,
    pin: PinId,
    registry: Arc<TaskRegistry>,
    blink_thread: Option<GpioThread>,
    stop_timeout: Duration,
    closed: bool,
}

impl<D: GpioDriver> OutputDevice<D> {
    /// Takes ownership of a GPIO backend and prepares `pin` for output, starting at the inactive
    /// level.
    ///
    /// The registry is shared, process-lifetime bookkeeping used to spot leaked blink tasks at
    /// teardown; see [`TaskRegistry`].
    pub fn new(mut driver: D, pin: PinId, registry: Arc<TaskRegistry>) -> Self {
        driver.init();
        driver.setcfg(pin, CfgMode::Output);
        driver.output(pin, Level::Low);

        Self {
            driver: Arc::new(Mutex::new(driver)),
            pin,
            registry,
            blink_thread: None,
            stop_timeout: STOP_TIMEOUT,
            closed: false,
        }
    }

    pub fn pin(&self) -> PinId {
        self.pin
    }

    /// Stops any running blink task, then drives the pin to the active level.
    pub fn on(&mut self) -> H3Result<()> {
        self.stop_blink()?;
        write_level(&self.driver, self.pin, true);
        Ok(())
    }

    /// Stops any running blink task, then drives the pin to the inactive level.
    pub fn off(&mut self) -> H3Result<()> {
        self.stop_blink()?;
        write_level(&self.driver, self.pin, false);
        Ok(())
    }

    /// Stops any running blink task and resets the GPIO backend. Idempotent; calling it again is
    /// a no-op.
    ///
    /// Prefer calling this over relying on `Drop` - a zombie blink task can only be reported
    /// here.
    pub fn close(&mut self) -> H3Result<()> {
        if self.closed {
            return Ok(());
        }

        self.stop_blink()?;
        self.driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .init();
        self.closed = true;
        debug!("output device on {:?} closed", self.pin);
        Ok(())
    }

    // The task reference is taken out up front: whatever `stop` reports, this device no longer
    // owns the task. A zombie stays visible through the registry.
    fn stop_blink(&mut self) -> H3Result<()> {
        if let Some(mut thread) = self.blink_thread.take() {
            thread.stop(self.stop_timeout).map_err(H3GpioError::TaskError)?;
        }
        Ok(())
    }
}

impl<D: GpioDriver + Send + 'static> OutputDevice<D> {
    /// Makes the device turn on and off repeatedly, as described by `pattern`.
    ///
    /// Any blink task from an earlier call is fully stopped before the new one starts, so at most
    /// one task ever toggles this pin. Cancellation is observed at the two waits per cycle; a
    /// pattern interrupted during its on-phase leaves the pin active, one interrupted during its
    /// off-phase leaves it inactive.
    pub fn blink(&mut self, pattern: Blink) -> H3Result<()> {
        self.stop_blink()?;

        let driver = Arc::clone(&self.driver);
        let pin = self.pin;
        let Blink {
            on_time,
            off_time,
            n,
            background,
        } = pattern;

        let mut thread = GpioThread::new(
            format!("blink-{:?}", pin),
            Arc::clone(&self.registry),
            move |stopping: &Event| blink_device(&*driver, pin, on_time, off_time, n, stopping),
        );
        thread.start().map_err(H3GpioError::TaskError)?;

        if background {
            self.blink_thread = Some(thread);
        } else {
            thread.join().map_err(H3GpioError::TaskError)?;
        }
        Ok(())
    }
}

impl<D: GpioDriver> Drop for OutputDevice<D> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("failed to close output device on {:?}: {}", self.pin, err);
        }
    }
}

impl<D: GpioDriver> eh::OutputPin for OutputDevice<D> {
    type Error = H3GpioError;

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.on()
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.off()
    }
}

fn write_level<D: GpioDriver>(driver: &Mutex<D>, pin: PinId, value: bool) {
    use Level::*;

    let level = if value { High } else { Low };
    driver
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .output(pin, level);
}

// The toggle loop run by a blink task. The two waits are the only points where cancellation is
// observed, so the pin is left at whatever level was written last.
fn blink_device<D: GpioDriver>(
    driver: &Mutex<D>,
    pin: PinId,
    on_time: Duration,
    off_time: Duration,
    n: Option<u64>,
    stopping: &Event,
) {
    let mut cycle = 0;
    while n.map_or(true, |total| cycle < total) {
        write_level(driver, pin, true);
        if stopping.wait(on_time) {
            break;
        }
        write_level(driver, pin, false);
        if stopping.wait(off_time) {
            break;
        }
        cycle += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TaskError;
    use std::thread::sleep;
    use std::time::Instant;

    #[derive(Debug, Clone, Eq, PartialEq)]
    enum Op {
        Init,
        Cfg(PinId, CfgMode),
        Out(PinId, Level),
    }

    #[derive(Clone, Default)]
    struct MockGpio {
        ops: Arc<Mutex<Vec<Op>>>,
        write_delay: Option<Duration>,
    }

    impl MockGpio {
        fn new() -> (Self, Arc<Mutex<Vec<Op>>>) {
            let mock = Self::default();
            let ops = Arc::clone(&mock.ops);
            (mock, ops)
        }

        // A backend whose writes block, standing in for a driver stuck in uninterruptible I/O.
        fn slow(write_delay: Duration) -> (Self, Arc<Mutex<Vec<Op>>>) {
            let mock = Self {
                ops: Arc::default(),
                write_delay: Some(write_delay),
            };
            let ops = Arc::clone(&mock.ops);
            (mock, ops)
        }
    }

    impl GpioDriver for MockGpio {
        fn init(&mut self) {
            self.ops.lock().unwrap().push(Op::Init);
        }

        fn setcfg(&mut self, pin: PinId, mode: CfgMode) {
            self.ops.lock().unwrap().push(Op::Cfg(pin, mode));
        }

        fn output(&mut self, pin: PinId, level: Level) {
            if let Some(delay) = self.write_delay {
                sleep(delay);
            }
            self.ops.lock().unwrap().push(Op::Out(pin, level));
        }
    }

    fn registry() -> Arc<TaskRegistry> {
        Arc::new(TaskRegistry::new())
    }

    // Levels written after the construction baseline.
    fn writes(ops: &Mutex<Vec<Op>>) -> Vec<Level> {
        ops.lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                Op::Out(_, level) => Some(*level),
                _ => None,
            })
            .skip(1)
            .collect()
    }

    #[test]
    fn construction_configures_pin_for_output() {
        let (mock, ops) = MockGpio::new();
        let _device = OutputDevice::new(mock, PinId::Phy7, registry());

        assert_eq!(
            ops.lock().unwrap()[..3],
            [
                Op::Init,
                Op::Cfg(PinId::Phy7, CfgMode::Output),
                Op::Out(PinId::Phy7, Level::Low),
            ]
        );
    }

    #[test]
    fn on_and_off_write_levels() {
        let (mock, ops) = MockGpio::new();
        let mut device = OutputDevice::new(mock, PinId::Phy7, registry());

        device.on().unwrap();
        device.off().unwrap();
        assert_eq!(writes(&ops), vec![Level::High, Level::Low]);
    }

    #[test]
    fn synchronous_blink_runs_exact_cycles() {
        let (mock, ops) = MockGpio::new();
        let registry = registry();
        let mut device = OutputDevice::new(mock, PinId::Phy7, Arc::clone(&registry));

        let start = Instant::now();
        device
            .blink(Blink {
                on_time: Duration::from_millis(100),
                off_time: Duration::from_millis(100),
                n: Some(3),
                background: false,
            })
            .unwrap();
        let elapsed = start.elapsed();

        use Level::*;
        assert_eq!(writes(&ops), vec![High, Low, High, Low, High, Low]);
        assert!(elapsed >= Duration::from_millis(550));
        assert!(elapsed < Duration::from_millis(1500));
        assert!(registry.is_empty());
    }

    #[test]
    fn off_interrupts_background_blink() {
        let (mock, ops) = MockGpio::new();
        let registry = registry();
        let mut device = OutputDevice::new(mock, PinId::Phy7, Arc::clone(&registry));

        device.blink(Blink::default()).unwrap();
        sleep(Duration::from_millis(50));

        let start = Instant::now();
        device.off().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));

        assert_eq!(writes(&ops), vec![Level::High, Level::Low]);
        assert!(registry.is_empty());

        // No further toggling once the task is stopped.
        sleep(Duration::from_millis(150));
        assert_eq!(writes(&ops), vec![Level::High, Level::Low]);
    }

    #[test]
    fn new_blink_stops_previous_task() {
        let (mock, ops) = MockGpio::new();
        let registry = registry();
        let mut device = OutputDevice::new(mock, PinId::Phy7, Arc::clone(&registry));

        device
            .blink(Blink {
                on_time: Duration::from_secs(5),
                ..Blink::default()
            })
            .unwrap();
        sleep(Duration::from_millis(50));

        device
            .blink(Blink {
                on_time: Duration::from_millis(50),
                off_time: Duration::from_millis(50),
                n: Some(1),
                background: false,
            })
            .unwrap();

        // The first task wrote exactly one high before it was cancelled mid-on-phase; only then
        // did the second pattern run its single cycle.
        use Level::*;
        assert_eq!(writes(&ops), vec![High, High, Low]);
        assert!(registry.is_empty());
    }

    #[test]
    fn close_is_idempotent() {
        let (mock, ops) = MockGpio::new();
        let registry = registry();
        let mut device = OutputDevice::new(mock, PinId::Phy7, Arc::clone(&registry));

        device.blink(Blink::default()).unwrap();
        device.close().unwrap();
        assert!(registry.is_empty());
        assert_eq!(*ops.lock().unwrap().last().unwrap(), Op::Init);

        let ops_after_close = ops.lock().unwrap().len();
        device.close().unwrap();
        assert_eq!(ops.lock().unwrap().len(), ops_after_close);
    }

    #[test]
    fn zombie_blink_task_propagates_to_caller() {
        let (mock, _ops) = MockGpio::slow(Duration::from_secs(1));
        let registry = registry();
        let mut device = OutputDevice::new(mock, PinId::Phy7, Arc::clone(&registry));
        device.stop_timeout = Duration::from_millis(50);

        device.blink(Blink::default()).unwrap();
        sleep(Duration::from_millis(20));

        let err = device.off().unwrap_err();
        assert!(matches!(
            err,
            H3GpioError::TaskError(TaskError::ZombieTask(_))
        ));
        // Reference cleared, but the task is still accounted for as live.
        assert_eq!(registry.live_tasks(), vec!["blink-Phy7".to_string()]);
    }

    #[test]
    fn device_works_as_embedded_hal_pin() {
        use embedded_hal::digital::v2::OutputPin;

        let (mock, ops) = MockGpio::new();
        let mut device = OutputDevice::new(mock, PinId::Phy7, registry());

        device.set_high().unwrap();
        device.set_low().unwrap();
        assert_eq!(writes(&ops), vec![Level::High, Level::Low]);
    }
}

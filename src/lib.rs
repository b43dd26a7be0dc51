//! LED and single-output control for [Allwinner H3](https://linux-sunxi.org/H3) based SBCs (Orange Pi PC and friends), with a cancellable background blink pattern.
//!
//! The pin itself is driven through the [`GpioDriver`] trait - either the bundled memory-mapped
//! [`Device`] backend or your own implementation. What this crate actually brings is the
//! lifecycle discipline around blinking: [`OutputDevice::blink`] toggles the pin from a dedicated
//! thread, every subsequent `on`/`off`/`blink`/`close` first stops that thread with a bounded
//! grace period, and a thread that refuses to die is reported as a [`TaskError::ZombieTask`]
//! instead of being silently leaked. A process-wide [`TaskRegistry`] lets you assert at teardown
//! that no blink thread survived.
//!
//! [`OutputDevice`] implements the [`embedded_hal`](https://crates.io/crates/embedded-hal)
//! digital output abstraction so it can be plugged into driver code written against the generic
//! traits.
//!
//! Code has been tested on an Orange Pi PC running [Armbian](https://www.armbian.com/orange-pi-pc/);
//! other H3 boards should work as long as the header pinout matches `PinId`.

use thiserror::Error;

mod device;
mod driver;
mod output;
mod pin_map;
mod task;

pub use device::error::DeviceError;
pub use device::Device;
pub use driver::{CfgMode, GpioDriver, Level};
pub use output::{Blink, OutputDevice, STOP_TIMEOUT};
pub use pin_map::PinId;
pub use task::registry::TaskRegistry;
pub use task::{Event, GpioThread, TaskError, TaskState};

/// Main error type for this crate.
///
/// For more details, see `TaskError` and `DeviceError` enums documentation.
#[derive(Error, Debug)]
pub enum H3GpioError {
    #[error("error while controlling a blink task")]
    TaskError(#[source] task::TaskError),
    #[error("error while operating on the GPIO device")]
    DeviceError(#[source] device::error::DeviceError),
}

pub type H3Result<T> = Result<T, H3GpioError>;

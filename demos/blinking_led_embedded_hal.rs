//! This example demonstrates the usage of embedded_hal trait usage.
//!
//! The main benefit over the blinking_led example is that `flash_led`
//! can be used for _any_ device with embedded-hal digital pins abstraction.
//!
//! This example assumes that physical pin #7 is connected to diode's anode (+).
//! Make sure to put resistor to reduce current flowing through the diode.

use embedded_hal::digital::v2::OutputPin;
use h3_blink_gpio::{Device, OutputDevice, PinId, TaskRegistry};
use std::error::Error;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

fn flash_led<E, T>(pin: &mut T) -> Result<(), Box<dyn Error>>
where
    E: Error + 'static,
    T: OutputPin<Error = E>,
{
    let flash_interval = Duration::from_millis(500);

    for _ in 0..10 {
        pin.set_high()?;
        sleep(flash_interval);
        pin.set_low()?;
        sleep(flash_interval);
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let gpio = Device::new()?;
    let mut led = OutputDevice::new(gpio, PinId::Phy7, Arc::new(TaskRegistry::new()));

    flash_led(&mut led)?;
    led.close()?;
    Ok(())
}

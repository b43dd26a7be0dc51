//! A very basic example of a program blinking a LED diode using native library API.
//!
//! This example assumes that physical pin #7 is connected to diode's anode (+).
//! Make sure to put resistor to reduce current flowing through the diode.

use h3_blink_gpio::{Blink, Device, OutputDevice, PinId, TaskRegistry};
use std::error::Error;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

fn main() -> Result<(), Box<dyn Error>> {
    let registry = Arc::new(TaskRegistry::new());
    let gpio = Device::new()?;
    let mut led = OutputDevice::new(gpio, PinId::Phy7, Arc::clone(&registry));

    // Toggle from a background thread while we go about our business.
    led.blink(Blink {
        on_time: Duration::from_millis(500),
        off_time: Duration::from_millis(500),
        ..Blink::default()
    })?;
    sleep(Duration::from_secs(10));

    led.close()?;
    assert!(registry.is_empty(), "a blink thread survived shutdown");
    Ok(())
}

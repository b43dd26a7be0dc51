use derive_try_from_primitive::TryFromPrimitive;

use crate::pin_map::PinId;

/// Interface every GPIO backend has to provide.
///
/// The shape mirrors the classic SBC register wrappers: `init` resets the subsystem, `setcfg`
/// selects a pin's direction and `output` writes a binary level. All three are expected to be
/// fast, synchronous and side-effect-only; error handling for broken hardware access belongs to
/// backend construction (see [`crate::Device::new`]), not to these calls.
pub trait GpioDriver {
    /// Resets the GPIO subsystem to its initial state. Idempotent.
    fn init(&mut self);

    /// Configures the direction of a pin.
    fn setcfg(&mut self, pin: PinId, mode: CfgMode);

    /// Writes a binary level to a pin previously configured as output.
    fn output(&mut self, pin: PinId, level: Level);
}

/// Pin direction values as written to the H3 configuration registers.
#[repr(u8)]
#[derive(TryFromPrimitive, Copy, Clone, Debug, Eq, PartialEq)]
pub enum CfgMode {
    Input = 0,
    Output = 1,
}

/// Enum representing possible values for a pin. It corresponds to low and high voltage states of
/// GPIO pins.
#[repr(u8)]
#[derive(TryFromPrimitive, Copy, Clone, Debug, Eq, PartialEq)]
pub enum Level {
    Low = 0,
    High = 1,
}

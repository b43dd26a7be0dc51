use std::io;
use thiserror::Error;

/// Enum representing possible failures when initializing the GPIO backend.
///
/// Initializing a backend can fail in two ways:
/// - DeviceAccessFailed - There is no access to the device file, either because of insufficient permissions or operating system misconfiguration.
/// - MemoryMapFailed - There is an error when trying to create a mmaped piece of memory to represent device file.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("failed to open memory device")]
    DeviceAccessFailed(#[source] nix::Error),
    #[error("failed to map device memory")]
    MemoryMapFailed(#[source] io::Error),
}

use byteorder::{ByteOrder, NativeEndian};
use memmap::{MmapMut, MmapOptions};
use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use std::collections::HashSet;
use std::convert::AsRef;
use std::fs::File;
use std::mem::size_of;
use std::path::Path;

pub mod error;

use crate::driver::{CfgMode, GpioDriver, Level};
use crate::pin_map::PinId;
use crate::{H3GpioError, H3Result};
use error::DeviceError;

/// Memory-mapped GPIO backend for the Allwinner H3.
///
/// This struct owns the memory mapping needed to access the PIO controller registers along with
/// the file handle for the device file provided by your operating system. Hand it to
/// [`crate::OutputDevice::new`] to drive a pin through it.
///
/// Opening `/dev/mem` requires superuser privileges on a stock sunxi kernel.
#[derive(Debug)]
pub struct Device {
    _file_handle: File,
    map: MmapMut,
    configured: HashSet<PinId>,
}

#[derive(Copy, Clone, Debug)]
struct PioRegisters {
    pin_id: PinId,
}

impl PioRegisters {
    /* On the H3 the PIO controller lives at 0x01C20800, i.e. 0x800 past the page boundary the
     * kernel lets us map. Ports are laid out back to back, 0x24 bytes each: four CFG words with a
     * 4-bit mode slot per pin (8 pins per word), then the DAT word. The layout has no holes, so
     * every `PinId` resolves to a valid offset with plain port/index arithmetic.
     */
    const PIO_OFFSET: usize = 0x800;
    const PORT_SPAN: usize = 0x24;
    const DAT_OFFSET: usize = 0x10;

    pub fn new(pin_id: PinId) -> Self {
        Self { pin_id }
    }

    fn port(&self) -> usize {
        self.pin_id as usize / 32
    }

    fn index(&self) -> usize {
        self.pin_id as usize % 32
    }

    fn port_base(&self) -> usize {
        Self::PIO_OFFSET + self.port() * Self::PORT_SPAN
    }

    pub fn cfg(&self) -> usize {
        self.port_base() + (self.index() / 8) * size_of::<u32>()
    }

    pub fn cfg_shift(&self) -> u32 {
        ((self.index() % 8) * 4) as u32
    }

    pub fn dat(&self) -> usize {
        self.port_base() + Self::DAT_OFFSET
    }

    pub fn dat_bit(&self) -> u32 {
        self.index() as u32
    }
}

impl Device {
    const GPIO_BLOCK_ADDR: u64 = 0x01C2_0000;
    const BLOCK_SIZE: usize = 4096;

    /// Instantiates a new backend, opening and memory-mapping the appropriate device file.
    ///
    /// This constructor can fail - if you have no access to the device file or memory mapping
    /// fails.
    pub fn new() -> H3Result<Self> {
        let (file_handle, map) = Self::load_device_file("/dev/mem")?;

        Ok(Self {
            _file_handle: file_handle,
            map,
            configured: HashSet::new(),
        })
    }

    fn load_device_file<T: AsRef<Path>>(device_path: T) -> H3Result<(File, MmapMut)> {
        use std::os::unix::io::FromRawFd;
        use DeviceError::*;

        let mut open_flags = OFlag::empty();
        open_flags.insert(OFlag::O_RDWR);
        open_flags.insert(OFlag::O_SYNC);
        open_flags.insert(OFlag::O_CLOEXEC);

        let file_fd = open(device_path.as_ref(), open_flags, Mode::empty())
            .map_err(|err| H3GpioError::DeviceError(DeviceAccessFailed(err)))?;

        // SAFETY: Validity of file_fd is checked by Nix.
        let handle = unsafe { File::from_raw_fd(file_fd) };

        let mut map_opts = MmapOptions::new();
        map_opts.offset(Self::GPIO_BLOCK_ADDR);
        map_opts.len(Self::BLOCK_SIZE);

        // SAFETY: File handle is valid at this point.
        let map = unsafe {
            map_opts
                .map_mut(&handle)
                .map_err(|err| H3GpioError::DeviceError(MemoryMapFailed(err)))?
        };

        Ok((handle, map))
    }

    fn read_reg(&self, offset: usize) -> u32 {
        NativeEndian::read_u32(&self.map[offset..])
    }

    fn write_reg(&mut self, offset: usize, value: u32) {
        NativeEndian::write_u32(&mut self.map[offset..], value);
    }

    fn set_mode(&mut self, pin: PinId, mode: CfgMode) {
        let registers = PioRegisters::new(pin);
        let cfg = self.read_reg(registers.cfg());
        let cleared = cfg & !(0b111 << registers.cfg_shift());
        self.write_reg(registers.cfg(), cleared | ((mode as u32) << registers.cfg_shift()));
    }
}

impl GpioDriver for Device {
    /// Returns every pin this handle configured back to input, the reset default for header
    /// pins. A fresh handle has nothing to undo, which keeps repeated calls harmless.
    fn init(&mut self) {
        let configured: Vec<PinId> = self.configured.drain().collect();
        for pin in configured {
            self.set_mode(pin, CfgMode::Input);
        }
    }

    fn setcfg(&mut self, pin: PinId, mode: CfgMode) {
        self.set_mode(pin, mode);
        match mode {
            CfgMode::Output => self.configured.insert(pin),
            CfgMode::Input => self.configured.remove(&pin),
        };
    }

    fn output(&mut self, pin: PinId, level: Level) {
        let registers = PioRegisters::new(pin);
        let dat = self.read_reg(registers.dat());

        let value = match level {
            Level::High => dat | (1 << registers.dat_bit()),
            Level::Low => dat & !(1 << registers.dat_bit()),
        };
        self.write_reg(registers.dat(), value);
    }
}

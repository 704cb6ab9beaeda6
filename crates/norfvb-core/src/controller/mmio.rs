//! Memory-mapped bus driver for the real controller
//!
//! Register writes and window accesses become volatile loads and stores at
//! the addresses the engine hands over.
//!
//! # Safety
//!
//! Constructing an [`MmioBus`] asserts that the register block and the flash
//! window are mapped, device memory, and not aliased by anything else for the
//! lifetime of the bus.

use super::regs::{pack, register_name, REG_BLOCK_SIZE};
use crate::bus::FlashBus;
use crate::error::{Error, Result};
use crate::relocate::PointerConverter;

/// Volatile MMIO implementation of [`FlashBus`]
#[derive(Debug)]
pub struct MmioBus {
    /// Address of the controller register block
    registers: usize,
    /// Address of the flash window
    window: usize,
    /// Size of the flash window in bytes
    window_size: usize,
}

impl MmioBus {
    /// Create a bus over an already mapped register block and flash window
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    /// - `registers .. registers + REG_BLOCK_SIZE` is the mapped controller
    /// - `window .. window + window_size` is the mapped flash window
    /// - No other code accesses either region while the bus exists
    pub unsafe fn new(registers: usize, window: usize, window_size: usize) -> Self {
        Self {
            registers,
            window,
            window_size,
        }
    }

    /// Current address of the register block
    pub fn registers(&self) -> usize {
        self.registers
    }

    /// Current address of the flash window
    pub fn window(&self) -> usize {
        self.window
    }

    fn window_offset(&self, address: usize, len: usize) -> Result<usize> {
        let offset = address.checked_sub(self.window).ok_or(Error::DeviceError)?;
        match offset.checked_add(len) {
            Some(end) if end <= self.window_size => Ok(offset),
            _ => Err(Error::DeviceError),
        }
    }
}

impl FlashBus for MmioBus {
    fn set_config(&mut self, command: u8, value: u32, register: usize) -> Result<()> {
        let offset = register
            .checked_sub(self.registers)
            .filter(|off| off + 4 <= REG_BLOCK_SIZE && off % 4 == 0)
            .ok_or(Error::DeviceError)?;
        log::trace!(
            "{} <- cmd {:#04x} value {:#08x}",
            register_name(offset),
            command,
            value
        );
        // SAFETY: the register lies inside the block `new` was given
        unsafe {
            core::ptr::write_volatile(register as *mut u32, pack(command, value));
        }
        Ok(())
    }

    fn write32(&mut self, address: usize, value: u32) -> Result<()> {
        self.window_offset(address, 4)?;
        if address % 4 != 0 {
            return Err(Error::DeviceError);
        }
        // SAFETY: aligned and inside the window `new` was given
        unsafe {
            core::ptr::write_volatile(address as *mut u32, value);
        }
        Ok(())
    }

    fn read(&mut self, address: usize, buf: &mut [u8]) -> Result<()> {
        self.window_offset(address, buf.len())?;
        for (i, byte) in buf.iter_mut().enumerate() {
            // SAFETY: inside the window `new` was given
            *byte = unsafe { core::ptr::read_volatile((address + i) as *const u8) };
        }
        Ok(())
    }

    fn relocate(&mut self, converter: &dyn PointerConverter) -> Result<()> {
        self.registers = converter.convert(self.registers)?;
        self.window = converter.convert(self.window)?;
        Ok(())
    }
}

//! Bus transaction capability
//!
//! The engine never touches the controller directly. Every register write
//! and every access to the memory-mapped flash window goes through a
//! [`FlashBus`] implementation, so the same engine runs against the real
//! controller ([`MmioBus`](crate::controller::MmioBus)) or a simulator.

use crate::error::Result;
use crate::relocate::PointerConverter;

/// Bus transaction trait
///
/// This is the whole contract between the programming engine and the
/// platform's bus driver.
///
/// ## Addresses
///
/// - `register` passed to [`set_config`](Self::set_config) is the absolute
///   address of a controller register (controller base + offset).
/// - `address` passed to [`write32`](Self::write32) and [`read`](Self::read)
///   is an absolute address inside the mapped flash window, in whatever
///   addressing mode is current (physical before relocation, converted after).
///
/// Implementations must not reorder calls: the programming protocol relies
/// on the exact order in which the engine issues them.
pub trait FlashBus {
    /// Write one controller register
    ///
    /// The upper byte of the register receives `command`, the lower 24 bits
    /// receive the lower 24 bits of `value`.
    fn set_config(&mut self, command: u8, value: u32, register: usize) -> Result<()>;

    /// Store one 32-bit word into the mapped flash window
    ///
    /// `address` is always 4-byte aligned.
    fn write32(&mut self, address: usize, value: u32) -> Result<()>;

    /// Copy `buf.len()` bytes out of the mapped flash window
    fn read(&mut self, address: usize, buf: &mut [u8]) -> Result<()>;

    /// Re-resolve every address the bus holds for the runtime addressing mode
    ///
    /// Called exactly once, by the engine's own relocation.
    fn relocate(&mut self, _converter: &dyn PointerConverter) -> Result<()> {
        Ok(())
    }
}

impl<B: FlashBus + ?Sized> FlashBus for &mut B {
    fn set_config(&mut self, command: u8, value: u32, register: usize) -> Result<()> {
        (**self).set_config(command, value, register)
    }

    fn write32(&mut self, address: usize, value: u32) -> Result<()> {
        (**self).write32(address, value)
    }

    fn read(&mut self, address: usize, buf: &mut [u8]) -> Result<()> {
        (**self).read(address, buf)
    }

    fn relocate(&mut self, converter: &dyn PointerConverter) -> Result<()> {
        (**self).relocate(converter)
    }
}

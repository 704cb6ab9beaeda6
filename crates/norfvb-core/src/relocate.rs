//! Boot-time to runtime address conversion
//!
//! When the firmware switches to its long-lived addressing mode every
//! address the flash stack dereferences has to be converted once. The
//! platform supplies the conversion as a [`PointerConverter`]; the engine,
//! the bus and the facade each convert what they hold.

use crate::error::{Error, ParamError, Result};

/// Converts a boot-time physical address into its runtime address
pub trait PointerConverter {
    /// Convert `physical` into the address valid after the transition
    fn convert(&self, physical: usize) -> Result<usize>;
}

impl<F> PointerConverter for F
where
    F: Fn(usize) -> Result<usize>,
{
    fn convert(&self, physical: usize) -> Result<usize> {
        self(physical)
    }
}

/// Converter for environments that keep a 1:1 mapping
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityConverter;

impl PointerConverter for IdentityConverter {
    fn convert(&self, physical: usize) -> Result<usize> {
        Ok(physical)
    }
}

/// Linear mapping of one physical window to a new base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetConverter {
    /// First physical address covered by the mapping
    pub physical_base: usize,
    /// Runtime address `physical_base` maps to
    pub virtual_base: usize,
    /// Size of the mapping in bytes
    pub size: usize,
}

impl OffsetConverter {
    /// Create a new linear mapping
    pub const fn new(physical_base: usize, virtual_base: usize, size: usize) -> Self {
        Self {
            physical_base,
            virtual_base,
            size,
        }
    }
}

impl PointerConverter for OffsetConverter {
    fn convert(&self, physical: usize) -> Result<usize> {
        let offset = physical
            .checked_sub(self.physical_base)
            .filter(|&off| off < self.size)
            .ok_or(Error::InvalidParameter(ParamError::OutsideWindow {
                addr: physical,
                len: 0,
            }))?;
        self.virtual_base
            .checked_add(offset)
            .ok_or(Error::InvalidParameter(ParamError::AddressOutOfRange))
    }
}

/// A list of converters tried in order; the first match wins
///
/// Platforms usually map the controller registers and the flash window
/// through separate descriptors.
#[derive(Debug, Clone, Copy)]
pub struct ConverterChain<'a>(pub &'a [OffsetConverter]);

impl PointerConverter for ConverterChain<'_> {
    fn convert(&self, physical: usize) -> Result<usize> {
        self.0
            .iter()
            .find_map(|c| c.convert(physical).ok())
            .ok_or(Error::InvalidParameter(ParamError::OutsideWindow {
                addr: physical,
                len: 0,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_converter() {
        let conv = OffsetConverter::new(0x2801_4000, 0x8000_0000, 0x1000);
        assert_eq!(conv.convert(0x2801_4000).unwrap(), 0x8000_0000);
        assert_eq!(conv.convert(0x2801_4010).unwrap(), 0x8000_0010);
        assert!(conv.convert(0x2801_5000).is_err());
        assert!(conv.convert(0x2801_3FFF).is_err());
    }

    #[test]
    fn test_chain_picks_matching_window() {
        let maps = [
            OffsetConverter::new(0x1000, 0x9000, 0x100),
            OffsetConverter::new(0x0, 0x10_0000, 0x1000),
        ];
        let chain = ConverterChain(&maps);
        assert_eq!(chain.convert(0x1004).unwrap(), 0x9004);
        assert_eq!(chain.convert(0x0FFC).unwrap(), 0x10_0FFC);
        assert!(chain.convert(0x2000).is_err());
    }

    #[test]
    fn test_closure_converter() {
        let conv = |addr: usize| -> Result<usize> { Ok(addr | 0x8000_0000) };
        assert_eq!(conv.convert(0x10).unwrap(), 0x8000_0010);
        assert_eq!(IdentityConverter.convert(0x10).unwrap(), 0x10);
    }
}

//! Block storage facade
//!
//! Presents the primary flash device as a run of equally sized logical
//! blocks, the shape variable-storage firmware expects. Logical block
//! addresses and in-block offsets are validated here and translated to
//! flash addresses for the [`NorFlashEngine`].

mod attributes;

pub use attributes::FvbAttributes;

use crate::bus::FlashBus;
use crate::descriptor::DeviceDescriptor;
use crate::engine::{EngineState, NorFlashEngine};
use crate::error::{Error, ParamError, Result};
use crate::relocate::PointerConverter;

/// One `(lba, count)` pair of an [`FlashFvb::erase_blocks`] request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseRange {
    /// First logical block to erase
    pub lba: u64,
    /// Number of blocks to erase
    pub count: u64,
}

impl EraseRange {
    /// Create a range of `count` blocks starting at `lba`
    pub const fn new(lba: u64, count: u64) -> Self {
        Self { lba, count }
    }
}

/// Lifecycle of the facade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FvbState {
    /// Serving requests with boot-time addresses
    Ready,
    /// Serving requests with runtime addresses
    Relocated,
}

/// Firmware volume block device over a [`NorFlashEngine`]
#[derive(Debug)]
pub struct FlashFvb<B> {
    engine: NorFlashEngine<B>,
    descriptor: DeviceDescriptor,
    attributes: FvbAttributes,
}

impl<B: FlashBus> FlashFvb<B> {
    /// Bring up the facade on the engine's primary device
    ///
    /// Initializes the engine unless that already happened.
    pub fn new(mut engine: NorFlashEngine<B>) -> Result<Self> {
        if engine.state() == EngineState::Uninitialized {
            engine.initialize()?;
        }
        let descriptor = *engine.devices().primary().ok_or(Error::DeviceError)?;

        log::debug!(
            "FVB on {}: {} blocks of {:#x} at {:#x}",
            descriptor.guid,
            descriptor.block_count(),
            descriptor.block_size,
            descriptor.region_base
        );

        Ok(Self {
            engine,
            descriptor,
            attributes: FvbAttributes::default(),
        })
    }

    /// Descriptor of the device behind the facade
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Size of one logical block in bytes
    pub fn block_size(&self) -> usize {
        self.descriptor.block_size
    }

    /// Number of logical blocks
    pub fn total_blocks(&self) -> u64 {
        self.descriptor.block_count()
    }

    /// Current lifecycle state
    pub fn state(&self) -> FvbState {
        match self.engine.state() {
            EngineState::Relocated => FvbState::Relocated,
            _ => FvbState::Ready,
        }
    }

    /// The engine behind the facade
    pub fn engine(&self) -> &NorFlashEngine<B> {
        &self.engine
    }

    /// Consume the facade and return the engine
    pub fn into_engine(self) -> NorFlashEngine<B> {
        self.engine
    }

    /// Current attribute mask
    pub fn get_attributes(&self) -> FvbAttributes {
        self.attributes
    }

    /// Request a new attribute mask and return the one now in effect
    ///
    /// See [`FvbAttributes::apply`] for which changes are accepted.
    pub fn set_attributes(&mut self, attributes: FvbAttributes) -> Result<FvbAttributes> {
        let applied = self.attributes.apply(attributes)?;
        if applied != self.attributes {
            log::debug!(
                "FVB attributes {:#010x} -> {:#010x}",
                self.attributes.bits(),
                applied.bits()
            );
        }
        self.attributes = applied;
        Ok(applied)
    }

    /// Physical address of the mapped region
    pub fn get_physical_address(&self) -> usize {
        self.descriptor.region_base
    }

    /// Block size and the number of blocks from `lba` to the end
    pub fn get_block_size(&self, lba: u64) -> Result<(usize, u64)> {
        let total = self.total_blocks();
        if lba >= total {
            return Err(ParamError::LbaOutOfRange { lba, total }.into());
        }
        Ok((self.block_size(), total - lba))
    }

    /// Read `buf.len()` bytes at `offset` inside block `lba`
    pub fn read(&mut self, lba: u64, offset: usize, buf: &mut [u8]) -> Result<()> {
        if !self.attributes.readable() {
            return Err(Error::AccessDenied);
        }
        let address = self.block_address(lba, offset, buf.len())?;
        self.engine.read(address, buf)
    }

    /// Program `data` at `offset` inside block `lba`
    ///
    /// Does not erase; the target bytes must already be erased.
    pub fn write(&mut self, lba: u64, offset: usize, data: &[u8]) -> Result<()> {
        if !self.attributes.writable() {
            return Err(Error::AccessDenied);
        }
        let address = self.block_address(lba, offset, data.len())?;
        log::debug!(
            "FVB write lba {} offset {:#x} len {:#x}",
            lba,
            offset,
            data.len()
        );
        self.engine.write(address, data)
    }

    /// Erase every range in order
    ///
    /// Best effort: a failed range is skipped and the first error is
    /// returned once all ranges were attempted. An unrecoverable error stops
    /// processing at once and is returned even when an earlier range already
    /// failed.
    pub fn erase_blocks(&mut self, ranges: &[EraseRange]) -> Result<()> {
        if !self.attributes.writable() {
            return Err(Error::AccessDenied);
        }

        let mut first_error = None;
        for range in ranges {
            match self.erase_range(*range) {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!(
                        "erase of {} block(s) at lba {} failed: {}",
                        range.count,
                        range.lba,
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Switch to runtime addressing
    pub fn relocate(&mut self, converter: &dyn PointerConverter) -> Result<()> {
        self.engine.relocate(converter)
    }

    fn erase_range(&mut self, range: EraseRange) -> Result<()> {
        let total = self.total_blocks();
        if range.count == 0 {
            return Err(ParamError::EmptyEraseRange { lba: range.lba }.into());
        }
        match range.lba.checked_add(range.count) {
            Some(end) if end <= total => {}
            _ => {
                return Err(ParamError::LbaOutOfRange {
                    lba: range.lba,
                    total,
                }
                .into())
            }
        }

        let offset = self.block_address(range.lba, 0, 0)?;
        let length = usize::try_from(range.count)
            .ok()
            .and_then(|count| count.checked_mul(self.block_size()))
            .ok_or(ParamError::AddressOutOfRange)?;

        log::debug!(
            "FVB erase lba {}..{} ({:#x} bytes at {:#x})",
            range.lba,
            range.lba + range.count,
            length,
            offset
        );
        self.engine.erase(offset, length)
    }

    /// Flash address of `offset` inside block `lba`, for an access of `len`
    fn block_address(&self, lba: u64, offset: usize, len: usize) -> Result<usize> {
        let total = self.total_blocks();
        if lba >= total {
            return Err(ParamError::LbaOutOfRange { lba, total }.into());
        }
        let block_size = self.block_size();
        match offset.checked_add(len) {
            Some(end) if end <= block_size => {}
            _ => {
                return Err(ParamError::BlockRangeExceeded {
                    offset,
                    len,
                    block_size,
                }
                .into())
            }
        }

        usize::try_from(lba)
            .ok()
            .and_then(|lba| lba.checked_mul(block_size))
            .and_then(|start| start.checked_add(offset))
            .and_then(|rel| rel.checked_add(self.descriptor.region_base))
            .ok_or_else(|| ParamError::AddressOutOfRange.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformConfig;

    /// Bus that serves erased reads and refuses everything else
    struct BlankBus;

    impl FlashBus for BlankBus {
        fn set_config(&mut self, _command: u8, _value: u32, _register: usize) -> Result<()> {
            Err(Error::DeviceError)
        }

        fn write32(&mut self, _address: usize, _value: u32) -> Result<()> {
            Err(Error::DeviceError)
        }

        fn read(&mut self, _address: usize, buf: &mut [u8]) -> Result<()> {
            buf.fill(0xFF);
            Ok(())
        }
    }

    fn fvb() -> FlashFvb<BlankBus> {
        FlashFvb::new(NorFlashEngine::new(BlankBus, PlatformConfig::default())).unwrap()
    }

    #[test]
    fn test_new_initializes_engine() {
        let fvb = fvb();
        assert_eq!(fvb.state(), FvbState::Ready);
        assert_eq!(fvb.engine().state(), EngineState::Ready);
        assert_eq!(fvb.total_blocks(), 256);
        assert_eq!(fvb.block_size(), 64 * 1024);
        assert_eq!(fvb.get_physical_address(), 0);
    }

    #[test]
    fn test_new_accepts_initialized_engine() {
        let mut engine = NorFlashEngine::new(BlankBus, PlatformConfig::default());
        engine.initialize().unwrap();
        assert!(FlashFvb::new(engine).is_ok());
    }

    #[test]
    fn test_new_propagates_config_errors() {
        let config = PlatformConfig {
            region_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            FlashFvb::new(NorFlashEngine::new(BlankBus, config)),
            Err(Error::ConfigMissing("flash region size"))
        ));
    }

    #[test]
    fn test_get_block_size() {
        let fvb = fvb();
        for lba in [0u64, 1, 100, 255] {
            assert_eq!(fvb.get_block_size(lba), Ok((64 * 1024, 256 - lba)));
        }
        assert_eq!(
            fvb.get_block_size(256),
            Err(Error::InvalidParameter(ParamError::LbaOutOfRange {
                lba: 256,
                total: 256
            }))
        );
    }

    #[test]
    fn test_read_bounds() {
        let mut fvb = fvb();
        let mut buf = [0u8; 8];
        fvb.read(255, 64 * 1024 - 8, &mut buf).unwrap();
        assert_eq!(buf, [0xFF; 8]);

        assert!(matches!(
            fvb.read(255, 64 * 1024 - 4, &mut buf),
            Err(Error::InvalidParameter(ParamError::BlockRangeExceeded { .. }))
        ));
        assert!(matches!(
            fvb.read(256, 0, &mut buf),
            Err(Error::InvalidParameter(ParamError::LbaOutOfRange { .. }))
        ));
        assert!(matches!(
            fvb.read(0, usize::MAX, &mut buf),
            Err(Error::InvalidParameter(ParamError::BlockRangeExceeded { .. }))
        ));
    }

    #[test]
    fn test_erase_ranges_validated() {
        let mut fvb = fvb();
        assert_eq!(
            fvb.erase_blocks(&[EraseRange::new(3, 0)]),
            Err(Error::InvalidParameter(ParamError::EmptyEraseRange { lba: 3 }))
        );
        assert_eq!(
            fvb.erase_blocks(&[EraseRange::new(250, 7)]),
            Err(Error::InvalidParameter(ParamError::LbaOutOfRange {
                lba: 250,
                total: 256
            }))
        );
        assert!(fvb.erase_blocks(&[EraseRange::new(u64::MAX, 2)]).is_err());
        fvb.erase_blocks(&[]).unwrap();
    }

    #[test]
    fn test_erase_reports_first_error() {
        let mut fvb = fvb();
        // The first range fails validation, the second aborts on the bus
        let err = fvb
            .erase_blocks(&[EraseRange::new(0, 0), EraseRange::new(1, 1)])
            .unwrap_err();
        assert!(err.is_fatal());

        let err = fvb
            .erase_blocks(&[EraseRange::new(0, 0), EraseRange::new(300, 1)])
            .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidParameter(ParamError::EmptyEraseRange { lba: 0 })
        );
    }

    #[test]
    fn test_attributes_gate_access() {
        let mut fvb = fvb();
        let attrs = fvb.get_attributes();
        let ro = fvb
            .set_attributes(attrs - FvbAttributes::WRITE_STATUS)
            .unwrap();
        assert!(!ro.writable());
        assert_eq!(fvb.write(0, 0, &[0; 4]), Err(Error::AccessDenied));
        assert_eq!(
            fvb.erase_blocks(&[EraseRange::new(0, 1)]),
            Err(Error::AccessDenied)
        );

        fvb.set_attributes(ro - FvbAttributes::READ_STATUS).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(fvb.read(0, 0, &mut buf), Err(Error::AccessDenied));

        assert_eq!(fvb.set_attributes(attrs), Ok(attrs));
        fvb.read(0, 0, &mut buf).unwrap();
    }
}

//! Platform configuration
//!
//! Base addresses, sizes and command opcodes are fixed per platform and
//! resolved once when the engine initializes. [`PlatformConfig::default`]
//! carries the FT-2000/4 values; with the `std` feature a configuration can
//! also be loaded from a TOML file:
//!
//! ```toml
//! [controller]
//! base = 0x28014000
//!
//! [flash]
//! base = 0x0
//! size = "16 MiB"
//! block_size = "64 KiB"
//! guid = "E7223039-5836-41E1-B542-D7EC736C5E59"
//! ```

#[cfg(feature = "std")]
mod toml;

#[cfg(feature = "std")]
pub use self::toml::ConfigError;

use crate::controller::CommandSet;
use crate::descriptor::{DeviceDescriptor, Guid};
use crate::error::{Error, ParamError, Result};

/// FT-2000/4 SPI controller register block
pub const DEFAULT_CONTROLLER_BASE: usize = 0x2801_4000;
/// FT-2000/4 boot flash window
pub const DEFAULT_FLASH_BASE: usize = 0x0;
/// 16 MiB boot flash
pub const DEFAULT_FLASH_SIZE: usize = 16 * 1024 * 1024;
/// 64 KiB erase unit
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;
/// Identity tag of the FT-2000/4 boot flash
pub const DEFAULT_GUID: Guid = Guid::new(
    0xE7223039,
    0x5836,
    0x41E1,
    [0xB5, 0x42, 0xD7, 0xEC, 0x73, 0x6C, 0x5E, 0x59],
);

/// Everything the engine resolves at initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformConfig {
    /// Physical base address of the controller registers
    pub controller_base: usize,
    /// Physical base address of the device's memory-mapped window
    pub flash_base: usize,
    /// Physical base address of the region exposed as a block device
    pub region_base: usize,
    /// Size of the exposed region in bytes
    pub region_size: usize,
    /// Erase unit size in bytes
    pub block_size: usize,
    /// Identity tag of the device
    pub guid: Guid,
    /// Opcodes programmed into the controller
    pub commands: CommandSet,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            controller_base: DEFAULT_CONTROLLER_BASE,
            flash_base: DEFAULT_FLASH_BASE,
            region_base: DEFAULT_FLASH_BASE,
            region_size: DEFAULT_FLASH_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            guid: DEFAULT_GUID,
            commands: CommandSet::STANDARD,
        }
    }
}

impl PlatformConfig {
    /// Check that every item initialization depends on is present and consistent
    pub fn validate(&self) -> Result<()> {
        if self.controller_base == 0 {
            return Err(Error::ConfigMissing("controller base address"));
        }
        if self.region_size == 0 {
            return Err(Error::ConfigMissing("flash region size"));
        }
        if self.block_size == 0 {
            return Err(Error::ConfigMissing("erase block size"));
        }
        if self.region_size % self.block_size != 0 {
            return Err(Error::InvalidParameter(ParamError::EraseLengthNotMultiple {
                len: self.region_size as u64,
                unit: self.block_size as u64,
            }));
        }
        if self.region_base < self.flash_base
            || self.region_base.checked_add(self.region_size).is_none()
        {
            return Err(Error::InvalidParameter(ParamError::AddressOutOfRange));
        }
        Ok(())
    }

    /// The device descriptor this configuration describes
    pub fn descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor {
            device_base: self.flash_base,
            region_base: self.region_base,
            size: self.region_size,
            block_size: self.block_size,
            guid: self.guid,
        }
    }
}

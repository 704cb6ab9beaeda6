//! Device descriptor registry
//!
//! Static description of the flash devices installed on the platform. The
//! registry is filled once from the platform configuration and consulted by
//! the block facade at initialization.

use core::fmt;
use core::str::FromStr;

use heapless::Vec;
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{Error, Result};

/// Maximum number of flash devices a registry can describe
pub const MAX_DEVICES: usize = 4;

/// 128-bit identity tag in the mixed-endian GUID byte layout
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned,
)]
#[repr(C)]
pub struct Guid {
    data1: U32,
    data2: U16,
    data3: U16,
    data4: [u8; 8],
}

impl Guid {
    /// Build a GUID from its canonical field split
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1: U32::new(data1),
            data2: U16::new(data2),
            data3: U16::new(data3),
            data4,
        }
    }

    /// Reinterpret 16 raw bytes as a GUID
    pub fn from_bytes(bytes: &[u8; 16]) -> Self {
        zerocopy::transmute!(*bytes)
    }

    /// The raw 16-byte representation
    pub fn to_bytes(&self) -> [u8; 16] {
        zerocopy::transmute!(*self)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.data1.get(),
            self.data2.get(),
            self.data3.get(),
            d[0],
            d[1],
            d[2],
            d[3],
            d[4],
            d[5],
            d[6],
            d[7]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

/// Error returned when a GUID string is malformed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseGuidError;

impl fmt::Display for ParseGuidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected GUID in 8-4-4-4-12 hex form")
    }
}

impl FromStr for Guid {
    type Err = ParseGuidError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        let mut parts = s.trim().split('-');
        let mut next = |len: usize| {
            parts
                .next()
                .filter(|p| p.len() == len && p.bytes().all(|b| b.is_ascii_hexdigit()))
                .ok_or(ParseGuidError)
        };
        let (p1, p2, p3, p4, p5) = (next(8)?, next(4)?, next(4)?, next(4)?, next(12)?);
        if parts.next().is_some() {
            return Err(ParseGuidError);
        }

        let hex = |s: &str| u64::from_str_radix(s, 16).map_err(|_| ParseGuidError);
        let mut data4 = [0u8; 8];
        data4[..2].copy_from_slice(&(hex(p4)? as u16).to_be_bytes());
        data4[2..].copy_from_slice(&hex(p5)?.to_be_bytes()[2..]);

        Ok(Self::new(hex(p1)? as u32, hex(p2)? as u16, hex(p3)? as u16, data4))
    }
}

/// Description of one installed flash device
///
/// Immutable after construction; lives as long as the platform does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Base address of the device's memory-mapped window
    pub device_base: usize,
    /// Base address of the region exposed as a block device
    pub region_base: usize,
    /// Size of the region in bytes
    pub size: usize,
    /// Erase unit ("block") size in bytes
    pub block_size: usize,
    /// Identity tag of the device
    pub guid: Guid,
}

impl DeviceDescriptor {
    /// Number of whole blocks in the region
    pub fn block_count(&self) -> u64 {
        if self.block_size == 0 {
            return 0;
        }
        (self.size / self.block_size) as u64
    }

    /// Check whether `[addr, addr + len)` lies inside the region
    pub fn contains(&self, addr: usize, len: usize) -> bool {
        let Some(end) = addr.checked_add(len) else {
            return false;
        };
        addr >= self.region_base && end <= self.region_base.saturating_add(self.size)
    }
}

/// Fixed-capacity table of installed devices
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<DeviceDescriptor, MAX_DEVICES>,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub const fn new() -> Self {
        Self { devices: Vec::new() }
    }

    /// Register a device
    ///
    /// Fails with `OutOfResources` once [`MAX_DEVICES`] are registered.
    pub fn register(&mut self, device: DeviceDescriptor) -> Result<()> {
        self.devices.push(device).map_err(|_| Error::OutOfResources)
    }

    /// The first registered device, which backs the block facade
    pub fn primary(&self) -> Option<&DeviceDescriptor> {
        self.devices.first()
    }

    /// Find the device whose region contains `[addr, addr + len)`
    pub fn find(&self, addr: usize, len: usize) -> Option<&DeviceDescriptor> {
        self.devices.iter().find(|d| d.contains(addr, len))
    }

    /// All registered devices
    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// True if no device is registered
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

//! Error types for norfvb-core
//!
//! This module provides a no_std compatible error type shared by the
//! programming engine and the block facade.

use core::fmt;

/// Details about a rejected parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamError {
    /// A single page program was asked to carry more than one page
    ChunkTooLarge {
        /// Requested chunk length
        len: usize,
    },
    /// Length is not a multiple of the 4-byte window word
    UnalignedLength {
        /// Offending length
        len: usize,
    },
    /// Address is not aligned to the 4-byte window word
    UnalignedAddress {
        /// Offending address
        addr: usize,
    },
    /// Erase length is not a whole number of erase units
    EraseLengthNotMultiple {
        /// Requested length
        len: u64,
        /// Erase unit size of the device
        unit: u64,
    },
    /// Logical block address is past the end of the device
    LbaOutOfRange {
        /// Requested LBA
        lba: u64,
        /// Number of blocks on the device
        total: u64,
    },
    /// Access crosses the end of the addressed block
    BlockRangeExceeded {
        /// Offset inside the block
        offset: usize,
        /// Access length
        len: usize,
        /// Block size of the device
        block_size: usize,
    },
    /// Address computation overflowed the address space
    AddressOutOfRange,
    /// An erase range with zero blocks
    EmptyEraseRange {
        /// First LBA of the range
        lba: u64,
    },
    /// Attempt to change attribute bits that are fixed or not supported
    AttributeNotSettable {
        /// The offending bits
        bits: u32,
    },
    /// Access falls outside the installed device window
    OutsideWindow {
        /// Start of the access
        addr: usize,
        /// Access length
        len: usize,
    },
}

/// What was in flight when an unrecoverable failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalCause {
    /// A page program inside a multi-chunk write failed
    WriteAborted,
    /// A bus transaction inside the erase-unit loop failed
    EraseAborted,
    /// The erase unit still was not blank after every retry
    EraseNotCompleted,
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Malformed address, length or alignment; nothing reached the bus
    InvalidParameter(ParamError),
    /// A bus transaction could not be completed
    DeviceError,
    /// A fixed-capacity table is full
    OutOfResources,
    /// Initialization could not resolve a required configuration item
    ConfigMissing(&'static str),
    /// The engine has not been initialized yet
    NotReady,
    /// The engine was already initialized
    AlreadyInitialized,
    /// The runtime relocation already happened
    AlreadyRelocated,
    /// The device attributes forbid the operation
    AccessDenied,
    /// The flash contents are undefined; the caller must stop
    Unrecoverable {
        /// Address of the chunk or erase unit that failed
        address: usize,
        /// Which phase failed
        cause: FatalCause,
    },
}

impl Error {
    /// True for failures that leave the chip in an undefined state.
    ///
    /// Top-level callers are expected to halt on these instead of retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unrecoverable { .. })
    }
}

impl From<ParamError> for Error {
    fn from(e: ParamError) -> Self {
        Self::InvalidParameter(e)
    }
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChunkTooLarge { len } => {
                write!(f, "chunk of {} bytes exceeds the 256-byte page", len)
            }
            Self::UnalignedLength { len } => {
                write!(f, "length {} is not 4-byte aligned", len)
            }
            Self::UnalignedAddress { addr } => {
                write!(f, "address 0x{:08X} is not 4-byte aligned", addr)
            }
            Self::EraseLengthNotMultiple { len, unit } => write!(
                f,
                "erase length 0x{:X} is not a multiple of the 0x{:X} erase unit",
                len, unit
            ),
            Self::LbaOutOfRange { lba, total } => {
                write!(f, "LBA {} out of range (device has {} blocks)", lba, total)
            }
            Self::BlockRangeExceeded {
                offset,
                len,
                block_size,
            } => write!(
                f,
                "offset 0x{:X} + length 0x{:X} crosses the 0x{:X}-byte block",
                offset, len, block_size
            ),
            Self::AddressOutOfRange => write!(f, "address computation overflowed"),
            Self::EmptyEraseRange { lba } => {
                write!(f, "erase range at LBA {} has no blocks", lba)
            }
            Self::AttributeNotSettable { bits } => {
                write!(f, "attribute bits 0x{:08X} cannot be changed", bits)
            }
            Self::OutsideWindow { addr, len } => write!(
                f,
                "0x{:X} bytes at 0x{:08X} fall outside the flash window",
                len, addr
            ),
        }
    }
}

impl fmt::Display for FatalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteAborted => write!(f, "page program aborted mid-write"),
            Self::EraseAborted => write!(f, "erase aborted mid-sequence"),
            Self::EraseNotCompleted => write!(f, "erase unit not blank after retries"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter(e) => write!(f, "invalid parameter: {}", e),
            Self::DeviceError => write!(f, "device error"),
            Self::OutOfResources => write!(f, "out of resources"),
            Self::ConfigMissing(item) => write!(f, "configuration missing: {}", item),
            Self::NotReady => write!(f, "flash engine not initialized"),
            Self::AlreadyInitialized => write!(f, "flash engine already initialized"),
            Self::AlreadyRelocated => write!(f, "runtime relocation already performed"),
            Self::AccessDenied => write!(f, "access denied by device attributes"),
            Self::Unrecoverable { address, cause } => {
                write!(f, "unrecoverable flash failure at 0x{:08X}: {}", address, cause)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

//! Firmware volume block attributes
//!
//! Bit values follow the UEFI `EFI_FVB_ATTRIBUTES_2` layout so the mask can
//! be handed to variable-storage firmware unchanged.

use bitflags::bitflags;

use crate::error::{Error, ParamError, Result};

bitflags! {
    /// Attribute mask of a firmware volume block device
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FvbAttributes: u32 {
        // Read
        /// Reads can be disabled
        const READ_DISABLED_CAP  = 1 << 0;
        /// Reads can be enabled
        const READ_ENABLED_CAP   = 1 << 1;
        /// Reads are currently enabled
        const READ_STATUS        = 1 << 2;

        // Write
        /// Writes can be disabled
        const WRITE_DISABLED_CAP = 1 << 3;
        /// Writes can be enabled
        const WRITE_ENABLED_CAP  = 1 << 4;
        /// Writes are currently enabled
        const WRITE_STATUS       = 1 << 5;

        // Lock
        /// The status bits can be locked
        const LOCK_CAP           = 1 << 6;
        /// The status bits are locked
        const LOCK_STATUS        = 1 << 7;

        // Device properties
        /// Bits can only be cleared by an erase
        const STICKY_WRITE       = 1 << 9;
        /// Contents are directly readable through the memory map
        const MEMORY_MAPPED      = 1 << 10;
        /// Erased bits read as 1
        const ERASE_POLARITY     = 1 << 11;
        /// Reads can be locked
        const READ_LOCK_CAP      = 1 << 12;
        /// Reads are locked
        const READ_LOCK_STATUS   = 1 << 13;
        /// Writes can be locked
        const WRITE_LOCK_CAP     = 1 << 14;
        /// Writes are locked
        const WRITE_LOCK_STATUS  = 1 << 15;

        /// Bits that `set_attributes` may change
        const STATUS = Self::READ_STATUS.bits()
            | Self::WRITE_STATUS.bits()
            | Self::LOCK_STATUS.bits();
    }
}

impl Default for FvbAttributes {
    /// Readable, writable, lockable NOR flash mapped into memory
    fn default() -> Self {
        Self::READ_DISABLED_CAP
            | Self::READ_ENABLED_CAP
            | Self::READ_STATUS
            | Self::WRITE_DISABLED_CAP
            | Self::WRITE_ENABLED_CAP
            | Self::WRITE_STATUS
            | Self::LOCK_CAP
            | Self::STICKY_WRITE
            | Self::MEMORY_MAPPED
            | Self::ERASE_POLARITY
    }
}

impl FvbAttributes {
    /// Reads are enabled
    pub fn readable(self) -> bool {
        self.contains(Self::READ_STATUS)
    }

    /// Writes and erases are enabled
    pub fn writable(self) -> bool {
        self.contains(Self::WRITE_STATUS)
    }

    /// Compute the mask that results from requesting `requested`
    ///
    /// Only status bits may differ from `self`, and each change needs its
    /// capability bit. Lock is sticky: once set, it cannot be cleared and
    /// the read/write status bits are frozen.
    pub fn apply(self, requested: FvbAttributes) -> Result<FvbAttributes> {
        let changed = self.symmetric_difference(requested);
        let fixed = changed.difference(Self::STATUS);
        if !fixed.is_empty() {
            return Err(ParamError::AttributeNotSettable { bits: fixed.bits() }.into());
        }
        if changed.is_empty() {
            return Ok(self);
        }

        if self.contains(Self::LOCK_STATUS) {
            return Err(Error::AccessDenied);
        }

        let mut missing = Self::empty();
        for (status, enable_cap, disable_cap) in [
            (
                Self::READ_STATUS,
                Self::READ_ENABLED_CAP,
                Self::READ_DISABLED_CAP,
            ),
            (
                Self::WRITE_STATUS,
                Self::WRITE_ENABLED_CAP,
                Self::WRITE_DISABLED_CAP,
            ),
            (Self::LOCK_STATUS, Self::LOCK_CAP, Self::LOCK_CAP),
        ] {
            if !changed.contains(status) {
                continue;
            }
            let cap = if requested.contains(status) {
                enable_cap
            } else {
                disable_cap
            };
            if !self.contains(cap) {
                missing |= status;
            }
        }
        if !missing.is_empty() {
            return Err(ParamError::AttributeNotSettable {
                bits: missing.bits(),
            }
            .into());
        }

        Ok(requested)
    }
}

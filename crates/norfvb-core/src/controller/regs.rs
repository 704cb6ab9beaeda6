//! NOR flash controller register definitions
//!
//! Offsets are relative to the controller base address. The controller
//! exposes the flash contents through a separate memory-mapped window; these
//! registers only sequence commands into the chip.

// ============================================================================
// Register offsets
// ============================================================================

/// Flash capability register
pub const REG_FLASH_CAP: usize = 0x000;
/// Read configuration register
pub const REG_RD_CFG: usize = 0x004;
/// Write configuration register (write enable for the data window)
pub const REG_WR_CFG: usize = 0x008;
/// Flush register, commits the page buffer to the chip
pub const REG_FLUSH: usize = 0x00C;
/// Command port
pub const REG_CMD_PORT: usize = 0x010;
/// Address port
pub const REG_ADDR_PORT: usize = 0x014;
/// High data port
pub const REG_HD_PORT: usize = 0x018;
/// Load port, latches whatever the command/address ports hold
pub const REG_LD_PORT: usize = 0x01C;
/// Chip select configuration
pub const REG_CS_CFG: usize = 0x020;
/// Write-in-progress configuration
pub const REG_WIP_CFG: usize = 0x024;
/// Write protect register
pub const REG_WP: usize = 0x028;

/// Size of the register block
pub const REG_BLOCK_SIZE: usize = 0x02C;

// ============================================================================
// Control values
// ============================================================================

/// Command port value for a plain command with no address phase
pub const CMD_PORT_PLAIN: u32 = 0x40_0000;
/// Command port value for a command followed by an address phase
pub const CMD_PORT_WITH_ADDR: u32 = 0x40_8000;
/// Write configuration that routes window writes into the page buffer
pub const WR_CFG_ENABLE: u32 = 0x00_0208;
/// Write configuration that detaches the window from the page buffer
pub const WR_CFG_DISABLE: u32 = 0x0;
/// Trigger value for the load and flush ports
pub const PORT_TRIGGER: u32 = 0x1;

/// Bit offset of the command opcode in a register write
///
/// Command-port control values only use the low 24 bits.
pub const COMMAND_SHIFT: u32 = 24;
/// Bits of a register word that carry the configuration value
pub const VALUE_MASK: u32 = 0x00FF_FFFF;

/// Human-readable register name for trace output
pub fn register_name(offset: usize) -> &'static str {
    match offset {
        REG_FLASH_CAP => "FLASH_CAP",
        REG_RD_CFG => "RD_CFG",
        REG_WR_CFG => "WR_CFG",
        REG_FLUSH => "FLUSH",
        REG_CMD_PORT => "CMD_PORT",
        REG_ADDR_PORT => "ADDR_PORT",
        REG_HD_PORT => "HD_PORT",
        REG_LD_PORT => "LD_PORT",
        REG_CS_CFG => "CS_CFG",
        REG_WIP_CFG => "WIP_CFG",
        REG_WP => "WP",
        _ => "?",
    }
}

/// Pack a command opcode and configuration value into one register word
///
/// Bits of `value` above [`VALUE_MASK`] are dropped so they can never
/// corrupt the opcode byte.
#[inline]
pub const fn pack(command: u8, value: u32) -> u32 {
    ((command as u32) << COMMAND_SHIFT) | (value & VALUE_MASK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack() {
        assert_eq!(pack(0x06, CMD_PORT_PLAIN), 0x0640_0000);
        assert_eq!(pack(0xD8, CMD_PORT_WITH_ADDR), 0xD840_8000);
        assert_eq!(pack(0, PORT_TRIGGER), 1);
    }

    #[test]
    fn test_pack_masks_value() {
        assert_eq!(pack(0xD8, 0xFF12_3456), 0xD812_3456);
        assert_eq!(pack(0, u32::MAX), VALUE_MASK);
    }
}

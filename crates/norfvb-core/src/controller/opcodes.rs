//! SPI NOR opcodes used by the programming engine

/// Write Enable, latched before every program or erase
pub const WREN: u8 = 0x06;
/// Page Program (up to 256 bytes)
pub const PP: u8 = 0x02;
/// 64 KiB Block Erase
pub const BE_D8: u8 = 0xD8;

/// The three opcodes the controller is programmed with
///
/// Set once at initialization and never re-derived afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSet {
    /// Prefix opcode selecting the chip for a program or erase
    pub write_enable: u8,
    /// Opcode used while the page buffer is flushed
    pub page_program: u8,
    /// Opcode erasing one erase unit
    pub block_erase: u8,
}

impl CommandSet {
    /// Standard SPI NOR command set
    pub const STANDARD: Self = Self {
        write_enable: WREN,
        page_program: PP,
        block_erase: BE_D8,
    };
}

impl Default for CommandSet {
    fn default() -> Self {
        Self::STANDARD
    }
}

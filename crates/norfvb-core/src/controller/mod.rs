//! NOR flash controller definitions
//!
//! Register layout, control values and opcodes of the SPI NOR controller,
//! plus the MMIO bus driver used on real hardware.

mod mmio;
pub mod opcodes;
pub mod regs;

pub use mmio::MmioBus;
pub use opcodes::CommandSet;

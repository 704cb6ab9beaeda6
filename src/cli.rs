//! CLI argument parsing

use clap::{Parser, Subcommand};
use norfvb_core::fvb::EraseRange;
use std::path::PathBuf;

/// Parse a string as a hex or decimal number
fn parse_number(s: &str) -> Result<u64, String> {
    let s = s.trim().replace('_', "");
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u64>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a hex or decimal byte count or offset
fn parse_usize(s: &str) -> Result<usize, String> {
    let n = parse_number(s)?;
    usize::try_from(n).map_err(|_| format!("Value too large: {}", s))
}

/// Parse an erase range written as `LBA:COUNT`
fn parse_erase_range(s: &str) -> Result<EraseRange, String> {
    let (lba, count) = s
        .split_once(':')
        .ok_or_else(|| format!("Expected LBA:COUNT, got '{}'", s))?;
    Ok(EraseRange::new(parse_number(lba)?, parse_number(count)?))
}

#[derive(Parser)]
#[command(name = "norfvb")]
#[command(
    author,
    version,
    about = "NOR flash block device tool (simulated controller)",
    long_about = None
)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Flash image backing the simulated chip (created erased if missing)
    #[arg(long, global = true, default_value = "norfvb.img")]
    pub image: PathBuf,

    /// Platform configuration file (TOML format)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show device geometry and attributes
    Info,

    /// Read bytes from one block
    Read {
        /// Logical block address
        #[arg(long, value_parser = parse_number)]
        lba: u64,

        /// Offset inside the block (hex or decimal)
        #[arg(long, value_parser = parse_usize, default_value = "0")]
        offset: usize,

        /// Number of bytes to read (hex or decimal)
        #[arg(short, long, value_parser = parse_usize)]
        length: usize,

        /// Output file path (hex dump to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a file into one block (the block must already be erased)
    Write {
        /// Logical block address
        #[arg(long, value_parser = parse_number)]
        lba: u64,

        /// Offset inside the block (hex or decimal)
        #[arg(long, value_parser = parse_usize, default_value = "0")]
        offset: usize,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Erase block ranges
    Erase {
        /// Range to erase as LBA:COUNT (repeatable)
        #[arg(long = "range", value_parser = parse_erase_range, required = true)]
        ranges: Vec<EraseRange>,
    },

    /// Read the whole region to a file
    Dump {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Erase and program the whole region from a file
    Program {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },
}

impl Commands {
    /// True for commands that change the image
    pub fn modifies_flash(&self) -> bool {
        matches!(
            self,
            Self::Write { .. } | Self::Erase { .. } | Self::Program { .. }
        )
    }
}

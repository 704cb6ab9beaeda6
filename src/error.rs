//! Error types for the norfvb tool

use std::io;
use thiserror::Error;

/// Everything a command can fail with
#[derive(Debug, Error)]
pub enum CliError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Platform configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] norfvb_core::config::ConfigError),

    /// The flash stack reported an error
    #[error("Flash error: {0}")]
    Flash(#[from] norfvb_core::Error),

    /// Progress bar template error
    #[error("Progress bar error: {0}")]
    Progress(#[from] indicatif::style::TemplateError),

    /// Image file larger than the simulated chip
    #[error("Image {path} is {actual} bytes, the chip holds {expected}")]
    ImageTooLarge {
        path: String,
        expected: usize,
        actual: usize,
    },

    /// Input does not fit where it was asked to go
    #[error("Input of {len} bytes does not fit: {reason}")]
    InputTooLarge { len: usize, reason: &'static str },
}

impl CliError {
    /// True if the flash contents can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Flash(e) if e.is_fatal())
    }
}

/// Result type for CLI commands
pub type Result<T> = std::result::Result<T, CliError>;

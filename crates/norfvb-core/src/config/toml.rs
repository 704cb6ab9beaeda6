//! TOML platform configuration parsing
//!
//! Every key is optional; missing keys keep the [`PlatformConfig::default`]
//! value. Addresses accept integers or `"0x..."` strings, sizes additionally
//! accept `"64 KiB"` / `"16 MiB"` forms.

use std::fmt;
use std::fs;
use std::path::Path;
use std::string::String;
use std::format;

use super::PlatformConfig;
use crate::descriptor::Guid;

/// Errors raised while loading a configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The file could not be read
    IoError,
    /// The file is not valid TOML or has unexpected keys
    ParseError(String),
    /// A value was present but malformed
    InvalidValue {
        /// Key of the malformed value
        key: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError => write!(f, "failed to read configuration file"),
            Self::ParseError(msg) => write!(f, "failed to parse configuration: {}", msg),
            Self::InvalidValue { key, reason } => write!(f, "invalid value for {}: {}", key, reason),
        }
    }
}

impl std::error::Error for ConfigError {}

/// TOML configuration file structure
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfigFile {
    #[serde(default)]
    controller: TomlController,
    #[serde(default)]
    flash: TomlFlash,
}

/// `[controller]` table
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlController {
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    base: Option<u64>,
    write_enable: Option<u8>,
    page_program: Option<u8>,
    block_erase: Option<u8>,
}

/// `[flash]` table
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlFlash {
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    base: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_number")]
    region_base: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_size")]
    size: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_size")]
    block_size: Option<u64>,
    guid: Option<String>,
}

/// Integer or string, as written in the file
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Int(u64),
    Str(String),
}

fn deserialize_opt_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Int(n)) => Ok(Some(n)),
        Some(NumberOrString::Str(s)) => parse_number(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn deserialize_opt_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Int(n)) => Ok(Some(n)),
        Some(NumberOrString::Str(s)) => parse_size(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Parse a number that can be hex (0x...) or decimal
pub(crate) fn parse_number(s: &str) -> Result<u64, String> {
    let s = s.trim().replace('_', "");
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

/// Parse a size string like "64 KiB", "16 MiB" or "0x10000"
pub(crate) fn parse_size(s: &str) -> Result<u64, String> {
    if let Ok(n) = parse_number(s) {
        return Ok(n);
    }

    let s_lower = s.trim().to_lowercase();
    let (num_str, multiplier) = if let Some(n) = s_lower.strip_suffix("mib") {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = s_lower.strip_suffix("kib") {
        (n.trim(), 1024)
    } else if let Some(n) = s_lower.strip_suffix('m') {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = s_lower.strip_suffix('k') {
        (n.trim(), 1024)
    } else {
        return Err(format!("invalid size: {}", s));
    };

    let num: u64 = num_str.parse().map_err(|_| format!("invalid size: {}", s))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size too large: {}", s))
}

fn to_usize(key: &'static str, value: u64) -> Result<usize, ConfigError> {
    usize::try_from(value).map_err(|_| ConfigError::InvalidValue {
        key,
        reason: format!("0x{:X} does not fit the address width", value),
    })
}

impl PlatformConfig {
    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|_| ConfigError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: TomlConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.message().into()))?;

        let mut config = PlatformConfig::default();

        if let Some(base) = file.controller.base {
            config.controller_base = to_usize("controller.base", base)?;
        }
        if let Some(op) = file.controller.write_enable {
            config.commands.write_enable = op;
        }
        if let Some(op) = file.controller.page_program {
            config.commands.page_program = op;
        }
        if let Some(op) = file.controller.block_erase {
            config.commands.block_erase = op;
        }

        if let Some(base) = file.flash.base {
            config.flash_base = to_usize("flash.base", base)?;
            config.region_base = config.flash_base;
        }
        if let Some(base) = file.flash.region_base {
            config.region_base = to_usize("flash.region_base", base)?;
        }
        if let Some(size) = file.flash.size {
            config.region_size = to_usize("flash.size", size)?;
        }
        if let Some(size) = file.flash.block_size {
            config.block_size = to_usize("flash.block_size", size)?;
        }
        if let Some(guid) = file.flash.guid {
            config.guid = guid
                .parse::<Guid>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "flash.guid",
                    reason: format!("{}", e),
                })?;
        }

        Ok(config)
    }
}

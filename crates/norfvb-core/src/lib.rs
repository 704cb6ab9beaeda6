//! norfvb-core - NOR flash programming engine and block facade
//!
//! This crate drives a memory-mapped SPI NOR controller (Phytium FT-2000/4
//! style command/address/load ports) and exposes the flash as a firmware
//! volume block device. It is `no_std` so it can run inside firmware.
//!
//! The layers, bottom up:
//!
//! - [`bus::FlashBus`] - the register/window transactions a platform provides
//! - [`engine::NorFlashEngine`] - page programs, block erases, reads
//! - [`fvb::FlashFvb`] - logical blocks, attributes, multi-range erase
//!
//! # Features
//!
//! - `std` - Enable standard library support and TOML configuration loading
//!
//! # Example
//!
//! ```ignore
//! use norfvb_core::config::PlatformConfig;
//! use norfvb_core::controller::MmioBus;
//! use norfvb_core::engine::NorFlashEngine;
//! use norfvb_core::fvb::{EraseRange, FlashFvb};
//!
//! let config = PlatformConfig::default();
//! let bus = unsafe { MmioBus::new(config.controller_base, config.flash_base, config.region_size) };
//! let mut fvb = FlashFvb::new(NorFlashEngine::new(bus, config))?;
//! fvb.erase_blocks(&[EraseRange::new(0, 1)])?;
//! fvb.write(0, 0, &[0xAA; 16])?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod bus;
pub mod config;
pub mod controller;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod fvb;
pub mod relocate;

pub use bus::FlashBus;
pub use engine::NorFlashEngine;
pub use error::{Error, Result};
pub use fvb::FlashFvb;

//! norfvb-sim - In-memory NOR flash controller emulator
//!
//! This crate emulates the SPI NOR controller and the flash chip behind it
//! as a [`FlashBus`], so the engine and the block facade can be exercised
//! without hardware. Register writes are decoded the way the controller
//! decodes them: commands are latched by the load port, window stores fill
//! the page buffer and the flush port commits it.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use norfvb_core::config::PlatformConfig;
use norfvb_core::controller::regs::{
    register_name, CMD_PORT_WITH_ADDR, PORT_TRIGGER, REG_ADDR_PORT, REG_BLOCK_SIZE, REG_CMD_PORT,
    REG_FLUSH, REG_LD_PORT, REG_WR_CFG, WR_CFG_ENABLE,
};
use norfvb_core::controller::CommandSet;
use norfvb_core::error::{Error, Result};
use norfvb_core::relocate::PointerConverter;
use norfvb_core::FlashBus;

/// Largest amount of data the page buffer holds
const PAGE_BUFFER_SIZE: usize = 256;

/// One call the emulator received, with absolute addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transaction {
    /// `set_config`
    Config {
        /// Absolute register address
        register: usize,
        /// Opcode byte
        command: u8,
        /// Low 24 bits
        value: u32,
    },
    /// `write32`
    Store {
        /// Absolute window address
        address: usize,
        /// Stored word
        value: u32,
    },
}

/// Emulated controller and flash chip
#[cfg(feature = "alloc")]
#[derive(Debug)]
pub struct SimController {
    controller_base: usize,
    window_base: usize,
    block_size: usize,
    commands: CommandSet,
    data: Vec<u8>,

    write_enabled: bool,
    pending: Option<(u8, u32)>,
    address: u32,
    program_armed: bool,
    page: Vec<(usize, u32)>,

    transactions: Vec<Transaction>,
    programs: Vec<(usize, usize)>,
    erase_attempts: Vec<usize>,
    fail_at: Option<usize>,
    stuck_erases: u32,
}

#[cfg(feature = "alloc")]
impl SimController {
    /// Create an erased chip covering the window `config` describes
    pub fn new(config: &PlatformConfig) -> Self {
        let size = config
            .region_base
            .saturating_sub(config.flash_base)
            .saturating_add(config.region_size);
        Self {
            controller_base: config.controller_base,
            window_base: config.flash_base,
            block_size: config.block_size.max(1),
            commands: config.commands,
            data: vec![0xFF; size],
            write_enabled: false,
            pending: None,
            address: 0,
            program_armed: false,
            page: Vec::new(),
            transactions: Vec::new(),
            programs: Vec::new(),
            erase_attempts: Vec::new(),
            fail_at: None,
            stuck_erases: 0,
        }
    }

    /// Create a chip with pre-filled contents
    pub fn with_data(config: &PlatformConfig, initial_data: &[u8]) -> Self {
        let mut sim = Self::new(config);
        let len = core::cmp::min(initial_data.len(), sim.data.len());
        sim.data[..len].copy_from_slice(&initial_data[..len]);
        sim
    }

    /// Get a reference to the flash data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get a mutable reference to the flash data
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Every transaction received so far
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Committed page programs as `(chip offset, length)`
    pub fn programs(&self) -> &[(usize, usize)] {
        &self.programs
    }

    /// Chip offsets of every erase command received, including stuck ones
    pub fn erase_attempts(&self) -> &[usize] {
        &self.erase_attempts
    }

    /// Forget the recorded history
    pub fn clear_history(&mut self) {
        self.transactions.clear();
        self.programs.clear();
        self.erase_attempts.clear();
    }

    /// Let `count` more transactions through, then fail every one after
    pub fn fail_after(&mut self, count: usize) {
        self.fail_at = Some(self.transactions.len() + count);
    }

    /// Make the next `count` erase commands leave the chip untouched
    pub fn stick_erases(&mut self, count: u32) {
        self.stuck_erases = count;
    }

    /// Current address of the register block
    pub fn controller_base(&self) -> usize {
        self.controller_base
    }

    /// Current address of the flash window
    pub fn window_base(&self) -> usize {
        self.window_base
    }

    fn record(&mut self, transaction: Transaction) -> Result<()> {
        if let Some(limit) = self.fail_at {
            if self.transactions.len() >= limit {
                log::debug!("sim: injected failure on {:?}", transaction);
                return Err(Error::DeviceError);
            }
        }
        self.transactions.push(transaction);
        Ok(())
    }

    fn window_offset(&self, address: usize, len: usize) -> Result<usize> {
        let offset = address
            .checked_sub(self.window_base)
            .ok_or(Error::DeviceError)?;
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(offset),
            _ => Err(Error::DeviceError),
        }
    }

    fn load(&mut self) {
        let Some((command, value)) = self.pending.take() else {
            log::warn!("sim: load with no command latched");
            return;
        };

        if command == self.commands.write_enable {
            self.write_enabled = true;
        } else if command == self.commands.block_erase && value == CMD_PORT_WITH_ADDR {
            self.handle_block_erase();
        } else {
            log::warn!("sim: unsupported command {:#04x} ({:#x})", command, value);
        }
    }

    fn handle_block_erase(&mut self) {
        let offset = self.address as usize;
        self.erase_attempts.push(offset);

        if !self.write_enabled {
            log::warn!("sim: erase at {:#x} without write enable ignored", offset);
            return;
        }
        self.write_enabled = false;

        if self.stuck_erases > 0 {
            self.stuck_erases -= 1;
            log::debug!("sim: erase at {:#x} stuck", offset);
            return;
        }

        // Erase sets the whole unit to 0xFF
        let start = offset - offset % self.block_size;
        let end = core::cmp::min(start + self.block_size, self.data.len());
        if start >= end {
            log::warn!("sim: erase at {:#x} past end of chip", offset);
            return;
        }
        for byte in &mut self.data[start..end] {
            *byte = 0xFF;
        }
    }

    fn flush(&mut self) {
        let page = core::mem::take(&mut self.page);
        if !(self.write_enabled && self.program_armed) {
            log::warn!("sim: flush of {} word(s) without program setup", page.len());
            return;
        }
        self.write_enabled = false;

        let Some(&(start, _)) = page.first() else {
            return;
        };
        // Programming can only change 1 -> 0
        for (offset, word) in &page {
            for (i, byte) in word.to_le_bytes().iter().enumerate() {
                self.data[offset + i] &= byte;
            }
        }
        self.programs.push((start, page.len() * 4));
    }
}

#[cfg(feature = "alloc")]
impl FlashBus for SimController {
    fn set_config(&mut self, command: u8, value: u32, register: usize) -> Result<()> {
        let offset = register
            .checked_sub(self.controller_base)
            .filter(|off| off + 4 <= REG_BLOCK_SIZE && off % 4 == 0)
            .ok_or(Error::DeviceError)?;
        self.record(Transaction::Config {
            register,
            command,
            value,
        })?;
        log::trace!(
            "sim: {} <- cmd {:#04x} value {:#08x}",
            register_name(offset),
            command,
            value
        );

        match offset {
            REG_CMD_PORT => self.pending = Some((command, value)),
            REG_ADDR_PORT => self.address = value,
            REG_LD_PORT if value & PORT_TRIGGER != 0 => self.load(),
            REG_WR_CFG => {
                self.program_armed =
                    command == self.commands.page_program && value == WR_CFG_ENABLE;
                if !self.program_armed {
                    self.page.clear();
                }
            }
            REG_FLUSH if value & PORT_TRIGGER != 0 => self.flush(),
            _ => {}
        }
        Ok(())
    }

    fn write32(&mut self, address: usize, value: u32) -> Result<()> {
        let offset = self.window_offset(address, 4)?;
        self.record(Transaction::Store { address, value })?;
        if !self.program_armed {
            log::warn!("sim: store to {:#x} while window is read-only", address);
            return Err(Error::DeviceError);
        }
        if self.page.len() * 4 >= PAGE_BUFFER_SIZE {
            log::warn!("sim: page buffer overflow at {:#x}", address);
            return Err(Error::DeviceError);
        }
        self.page.push((offset, value));
        Ok(())
    }

    fn read(&mut self, address: usize, buf: &mut [u8]) -> Result<()> {
        let offset = self.window_offset(address, buf.len())?;
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
        Ok(())
    }

    fn relocate(&mut self, converter: &dyn PointerConverter) -> Result<()> {
        self.controller_base = converter.convert(self.controller_base)?;
        self.window_base = converter.convert(self.window_base)?;
        Ok(())
    }
}

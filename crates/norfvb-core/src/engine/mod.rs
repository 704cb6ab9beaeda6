//! Flash programming engine
//!
//! Turns read/write/erase requests at byte granularity into controller
//! register sequences on a [`FlashBus`]. The engine owns the command set,
//! the chunk sizing and the erase-unit addressing; range checks in terms of
//! logical blocks belong to the [`fvb`](crate::fvb) facade.
//!
//! All addresses taken by the engine are physical flash addresses. Window
//! accesses are translated to the current mapping of the window, so callers
//! keep using the same addresses after [`NorFlashEngine::relocate`].

mod session;

pub use session::{Chunk, ProgramSession, PAGE_SIZE, WORD_SIZE};

use crate::bus::FlashBus;
use crate::config::PlatformConfig;
use crate::controller::regs::{
    CMD_PORT_PLAIN, CMD_PORT_WITH_ADDR, PORT_TRIGGER, REG_ADDR_PORT, REG_CMD_PORT, REG_FLUSH,
    REG_LD_PORT, REG_WR_CFG, WR_CFG_DISABLE, WR_CFG_ENABLE,
};
use crate::controller::CommandSet;
use crate::descriptor::DeviceRegistry;
use crate::error::{Error, FatalCause, ParamError, Result};
use crate::relocate::PointerConverter;

/// How many times one erase unit is erased before giving up
pub const NOR_FLASH_ERASE_RETRY: u32 = 10;

/// The erased value for flash memory (all bits set)
pub const ERASED_VALUE: u8 = 0xFF;

/// Lifecycle of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Constructed, `initialize` not yet run
    Uninitialized,
    /// Initialized, boot-time addressing
    Ready,
    /// Initialized, runtime addressing
    Relocated,
}

/// Programming engine for one SPI NOR controller
///
/// Replaces the opcode and base-address globals of a classic firmware
/// driver: everything the protocol needs lives here and every operation
/// takes `&mut self`, so one engine is one serialized owner of the chip.
#[derive(Debug)]
pub struct NorFlashEngine<B> {
    bus: B,
    config: PlatformConfig,
    state: EngineState,
    commands: Option<CommandSet>,
    controller_base: usize,
    window_base: usize,
    registry: DeviceRegistry,
}

impl<B: FlashBus> NorFlashEngine<B> {
    /// Create an engine; nothing is resolved until [`initialize`](Self::initialize)
    pub fn new(bus: B, config: PlatformConfig) -> Self {
        Self {
            bus,
            config,
            state: EngineState::Uninitialized,
            commands: None,
            controller_base: 0,
            window_base: 0,
            registry: DeviceRegistry::new(),
        }
    }

    /// Program the command set and resolve the controller base
    ///
    /// Must run exactly once before any other operation.
    pub fn initialize(&mut self) -> Result<()> {
        if self.state != EngineState::Uninitialized {
            return Err(Error::AlreadyInitialized);
        }
        self.config.validate()?;
        self.registry.register(self.config.descriptor())?;

        self.commands = Some(self.config.commands);
        self.controller_base = self.config.controller_base;
        self.window_base = self.config.flash_base;
        self.state = EngineState::Ready;

        log::debug!(
            "NOR flash engine ready: controller {:#x}, window {:#x}, opcodes WREN {:#04x} PP {:#04x} ERASE {:#04x}",
            self.controller_base,
            self.window_base,
            self.config.commands.write_enable,
            self.config.commands.page_program,
            self.config.commands.block_erase
        );
        Ok(())
    }

    /// The installed devices
    pub fn devices(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The configuration the engine was built from
    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// Programmed command set, once initialized
    pub fn commands(&self) -> Option<CommandSet> {
        self.commands
    }

    /// Current address of the controller register block
    pub fn controller_base(&self) -> usize {
        self.controller_base
    }

    /// Current address of the flash window
    pub fn window_base(&self) -> usize {
        self.window_base
    }

    /// Get a reference to the bus driver
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Get a mutable reference to the bus driver
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Consume the engine and return the bus driver
    pub fn into_bus(self) -> B {
        self.bus
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Copy `buf.len()` bytes starting at `address` out of the flash window
    ///
    /// Reads are memory-mapped; no command sequence is issued.
    pub fn read(&mut self, address: usize, buf: &mut [u8]) -> Result<()> {
        self.ready()?;
        self.check_window(address, buf.len())?;
        log::debug!("read {:#x} bytes at {:#x}", buf.len(), address);
        let mapped = self.mapped(address);
        self.bus.read(mapped, buf)
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Program up to one page
    ///
    /// `data.len()` must be at most [`PAGE_SIZE`] and a multiple of
    /// [`WORD_SIZE`]; `address` must be word aligned. A rejected request never
    /// reaches the bus. The sequence itself has no recovery: a bus error
    /// mid-way is returned as-is and leaves the page buffer undefined.
    pub fn write_chunk(&mut self, address: usize, data: &[u8]) -> Result<()> {
        let commands = self.ready()?;
        if data.len() > PAGE_SIZE {
            return Err(ParamError::ChunkTooLarge { len: data.len() }.into());
        }
        if data.len() % WORD_SIZE != 0 {
            return Err(ParamError::UnalignedLength { len: data.len() }.into());
        }
        if address % WORD_SIZE != 0 {
            return Err(ParamError::UnalignedAddress { addr: address }.into());
        }
        self.check_window(address, data.len())?;

        log::trace!("page program {:#x} bytes at {:#x}", data.len(), address);

        self.select_chip(commands)?;
        self.set_config(commands.page_program, WR_CFG_ENABLE, REG_WR_CFG)?;

        let mapped = self.mapped(address);
        for (i, word) in data.chunks_exact(WORD_SIZE).enumerate() {
            let value = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            self.bus.write32(mapped + i * WORD_SIZE, value)?;
        }

        self.set_config(0, PORT_TRIGGER, REG_FLUSH)?;
        self.set_config(0, WR_CFG_DISABLE, REG_WR_CFG)
    }

    /// Program an arbitrary amount of data
    ///
    /// The target must have been erased; this is not checked. Alignment and
    /// range are validated up front. Once the first page program has been
    /// issued, any failure is reported as [`Error::Unrecoverable`].
    pub fn write(&mut self, address: usize, data: &[u8]) -> Result<()> {
        self.ready()?;
        if data.is_empty() {
            return Ok(());
        }
        if data.len() % WORD_SIZE != 0 {
            return Err(ParamError::UnalignedLength { len: data.len() }.into());
        }
        if address % WORD_SIZE != 0 {
            return Err(ParamError::UnalignedAddress { addr: address }.into());
        }
        self.check_window(address, data.len())?;

        let session = ProgramSession::new(address, data);
        log::debug!(
            "write {:#x} bytes at {:#x} in {} page program(s)",
            data.len(),
            address,
            session.len()
        );

        for chunk in session {
            if let Err(e) = self.write_chunk(chunk.address, chunk.data) {
                log::error!("page program at {:#x} failed: {}", chunk.address, e);
                return Err(Error::Unrecoverable {
                    address: chunk.address,
                    cause: FatalCause::WriteAborted,
                });
            }
        }
        Ok(())
    }

    // =========================================================================
    // Erase
    // =========================================================================

    /// Issue the erase sequence for the unit containing `block_address`
    ///
    /// The whole unit starting at `block_address` must lie inside the
    /// device window; otherwise nothing reaches the bus.
    ///
    /// Fire-and-forget: the chip is not polled for completion. Use
    /// [`erase`](Self::erase) for a checked erase.
    pub fn erase_single_block(&mut self, block_address: usize) -> Result<()> {
        let commands = self.ready()?;
        self.check_window(block_address, self.config.block_size)?;
        let chip_offset = u32::try_from(block_address - self.config.flash_base)
            .map_err(|_| ParamError::AddressOutOfRange)?;
        log::trace!("erase unit at {:#x} (chip offset {:#x})", block_address, chip_offset);

        self.select_chip(commands)?;
        self.set_config(commands.block_erase, CMD_PORT_WITH_ADDR, REG_CMD_PORT)?;
        self.set_config(0, chip_offset, REG_ADDR_PORT)?;
        self.set_config(0, PORT_TRIGGER, REG_LD_PORT)
    }

    /// Erase `length` bytes starting at `offset`, one erase unit at a time
    ///
    /// `length` must be a whole number of erase units. Each unit is read back
    /// after its erase and re-erased, up to [`NOR_FLASH_ERASE_RETRY`]
    /// attempts, until it is blank. Failures inside the loop are
    /// [`Error::Unrecoverable`].
    pub fn erase(&mut self, offset: usize, length: usize) -> Result<()> {
        self.ready()?;
        let unit = self.config.block_size;
        if length % unit != 0 {
            return Err(ParamError::EraseLengthNotMultiple {
                len: length as u64,
                unit: unit as u64,
            }
            .into());
        }
        self.check_window(offset, length)?;

        let count = length / unit;
        log::debug!("erase {} unit(s) of {:#x} at {:#x}", count, unit, offset);

        for index in 0..count {
            self.erase_unit(offset + index * unit)?;
        }
        Ok(())
    }

    fn erase_unit(&mut self, address: usize) -> Result<()> {
        let fatal = |cause| Error::Unrecoverable { address, cause };

        for attempt in 1..=NOR_FLASH_ERASE_RETRY {
            if let Err(e) = self.erase_single_block(address) {
                log::error!("erase at {:#x} failed: {}", address, e);
                return Err(fatal(FatalCause::EraseAborted));
            }
            match self.is_blank(address, self.config.block_size) {
                Ok(true) => return Ok(()),
                Ok(false) => log::warn!(
                    "erase at {:#x} incomplete, attempt {}/{}",
                    address,
                    attempt,
                    NOR_FLASH_ERASE_RETRY
                ),
                Err(e) => {
                    log::error!("erase verify at {:#x} failed: {}", address, e);
                    return Err(fatal(FatalCause::EraseAborted));
                }
            }
        }

        log::error!(
            "erase at {:#x} still incomplete after {} attempts",
            address,
            NOR_FLASH_ERASE_RETRY
        );
        Err(fatal(FatalCause::EraseNotCompleted))
    }

    /// Check whether `[address, address + len)` reads back as erased
    pub fn is_blank(&mut self, address: usize, len: usize) -> Result<bool> {
        let mut buf = [0u8; PAGE_SIZE];
        let mut done = 0;
        while done < len {
            let n = (len - done).min(PAGE_SIZE);
            self.read(address + done, &mut buf[..n])?;
            if buf[..n].iter().any(|&b| b != ERASED_VALUE) {
                return Ok(false);
            }
            done += n;
        }
        Ok(true)
    }

    // =========================================================================
    // Runtime relocation
    // =========================================================================

    /// Switch every held address to the runtime addressing mode
    ///
    /// Converts the controller base and the window base, then lets the bus
    /// re-resolve its own references. Runs once, after initialization, while
    /// no operation is in flight. Chip offsets sent to the address port stay
    /// physical.
    pub fn relocate(&mut self, converter: &dyn PointerConverter) -> Result<()> {
        match self.state {
            EngineState::Uninitialized => return Err(Error::NotReady),
            EngineState::Relocated => return Err(Error::AlreadyRelocated),
            EngineState::Ready => {}
        }

        let controller_base = converter.convert(self.controller_base)?;
        let window_base = converter.convert(self.window_base)?;
        self.bus.relocate(converter)?;

        log::debug!(
            "relocated controller {:#x} -> {:#x}, window {:#x} -> {:#x}",
            self.controller_base,
            controller_base,
            self.window_base,
            window_base
        );
        self.controller_base = controller_base;
        self.window_base = window_base;
        self.state = EngineState::Relocated;
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn ready(&self) -> Result<CommandSet> {
        self.commands.ok_or(Error::NotReady)
    }

    /// Latch the write-enable prefix that selects the chip for program/erase
    fn select_chip(&mut self, commands: CommandSet) -> Result<()> {
        self.set_config(commands.write_enable, CMD_PORT_PLAIN, REG_CMD_PORT)?;
        self.set_config(0, PORT_TRIGGER, REG_LD_PORT)
    }

    fn set_config(&mut self, command: u8, value: u32, offset: usize) -> Result<()> {
        self.bus
            .set_config(command, value, self.controller_base + offset)
    }

    fn check_window(&self, address: usize, len: usize) -> Result<()> {
        match self.registry.find(address, len) {
            Some(_) => Ok(()),
            None => Err(ParamError::OutsideWindow { addr: address, len }.into()),
        }
    }

    fn mapped(&self, address: usize) -> usize {
        address - self.config.flash_base + self.window_base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CONTROLLER_BASE;
    use crate::controller::regs::REG_BLOCK_SIZE;
    use crate::relocate::{ConverterChain, OffsetConverter};
    use std::vec;
    use std::vec::Vec;

    /// Everything the engine asked of the bus
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Op {
        Config {
            command: u8,
            value: u32,
            offset: usize,
        },
        Store {
            address: usize,
            value: u32,
        },
    }

    /// Bus double that records calls and serves reads from a flat image
    struct RecordingBus {
        ops: Vec<Op>,
        controller: usize,
        image: Vec<u8>,
        window: usize,
        fail_at: Option<usize>,
    }

    impl RecordingBus {
        fn new(config: &PlatformConfig) -> Self {
            Self {
                ops: Vec::new(),
                controller: config.controller_base,
                image: vec![ERASED_VALUE; config.region_size],
                window: config.flash_base,
                fail_at: None,
            }
        }

        fn configs(&self) -> usize {
            self.ops
                .iter()
                .filter(|op| matches!(op, Op::Config { .. }))
                .count()
        }

        fn stores(&self) -> Vec<(usize, u32)> {
            self.ops
                .iter()
                .filter_map(|op| match *op {
                    Op::Store { address, value } => Some((address, value)),
                    _ => None,
                })
                .collect()
        }

        fn record(&mut self, op: Op) -> Result<()> {
            if self.fail_at == Some(self.ops.len()) {
                return Err(Error::DeviceError);
            }
            self.ops.push(op);
            Ok(())
        }
    }

    impl FlashBus for RecordingBus {
        fn set_config(&mut self, command: u8, value: u32, register: usize) -> Result<()> {
            let offset = register - self.controller;
            assert!(offset < REG_BLOCK_SIZE, "register {:#x} outside block", register);
            self.record(Op::Config {
                command,
                value,
                offset,
            })
        }

        fn write32(&mut self, address: usize, value: u32) -> Result<()> {
            self.record(Op::Store { address, value })
        }

        fn read(&mut self, address: usize, buf: &mut [u8]) -> Result<()> {
            let start = address - self.window;
            buf.copy_from_slice(&self.image[start..start + buf.len()]);
            Ok(())
        }

        fn relocate(&mut self, converter: &dyn PointerConverter) -> Result<()> {
            self.controller = converter.convert(self.controller)?;
            self.window = converter.convert(self.window)?;
            Ok(())
        }
    }

    fn small_config() -> PlatformConfig {
        PlatformConfig {
            region_size: 4 * 64 * 1024,
            ..Default::default()
        }
    }

    fn engine() -> NorFlashEngine<RecordingBus> {
        let config = small_config();
        let mut engine = NorFlashEngine::new(RecordingBus::new(&config), config);
        engine.initialize().unwrap();
        engine
    }

    fn config(command: u8, value: u32, offset: usize) -> Op {
        Op::Config {
            command,
            value,
            offset,
        }
    }

    #[test]
    fn test_operations_need_initialize() {
        let config = small_config();
        let mut engine = NorFlashEngine::new(RecordingBus::new(&config), config);
        let mut buf = [0u8; 4];
        assert_eq!(engine.read(0, &mut buf), Err(Error::NotReady));
        assert_eq!(engine.write_chunk(0, &[0; 4]), Err(Error::NotReady));
        assert_eq!(engine.erase(0, 0x10000), Err(Error::NotReady));
        assert!(engine.devices().is_empty());

        engine.initialize().unwrap();
        assert_eq!(engine.state(), EngineState::Ready);
        assert_eq!(engine.commands(), Some(CommandSet::STANDARD));
        assert_eq!(engine.controller_base(), DEFAULT_CONTROLLER_BASE);
        assert_eq!(engine.devices().len(), 1);
        assert_eq!(engine.initialize(), Err(Error::AlreadyInitialized));
    }

    #[test]
    fn test_initialize_reports_missing_config() {
        let config = PlatformConfig {
            controller_base: 0,
            ..small_config()
        };
        let mut engine = NorFlashEngine::new(RecordingBus::new(&small_config()), config);
        assert_eq!(
            engine.initialize(),
            Err(Error::ConfigMissing("controller base address"))
        );
        assert_eq!(engine.state(), EngineState::Uninitialized);
    }

    #[test]
    fn test_write_chunk_sequence() {
        let mut engine = engine();
        let data = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
        engine.write_chunk(0x100, &data).unwrap();

        assert_eq!(
            engine.bus().ops,
            [
                config(0x06, 0x40_0000, REG_CMD_PORT),
                config(0, 0x1, REG_LD_PORT),
                config(0x02, 0x208, REG_WR_CFG),
                Op::Store {
                    address: 0x100,
                    value: 0x4433_2211
                },
                Op::Store {
                    address: 0x104,
                    value: 0x8877_6655
                },
                config(0, 0x1, REG_FLUSH),
                config(0, 0x0, REG_WR_CFG),
            ]
        );
    }

    #[test]
    fn test_write_chunk_one_sequence_for_valid_lengths() {
        for len in (0..=PAGE_SIZE).step_by(WORD_SIZE) {
            let mut engine = engine();
            let data = vec![0u8; len];
            engine.write_chunk(0x200, &data).unwrap();
            assert_eq!(engine.bus().configs(), 5, "len {}", len);
            assert_eq!(engine.bus().stores().len(), len / WORD_SIZE);
        }
    }

    #[test]
    fn test_write_chunk_rejects_without_bus_traffic() {
        let mut engine = engine();
        let cases: [(usize, usize, ParamError); 4] = [
            (0, 260, ParamError::ChunkTooLarge { len: 260 }),
            (0, 6, ParamError::UnalignedLength { len: 6 }),
            (2, 8, ParamError::UnalignedAddress { addr: 2 }),
            (0, 257, ParamError::ChunkTooLarge { len: 257 }),
        ];
        for (addr, len, expected) in cases {
            let data = vec![0u8; len];
            assert_eq!(
                engine.write_chunk(addr, &data),
                Err(Error::InvalidParameter(expected))
            );
        }
        assert!(engine.bus().ops.is_empty());
    }

    #[test]
    fn test_write_splits_into_pages() {
        let mut engine = engine();
        let data: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        engine.write(0x1_0000, &data).unwrap();

        // Two page programs: 5 register writes each, 64 + 11 window stores
        assert_eq!(engine.bus().configs(), 10);
        let stores = engine.bus().stores();
        assert_eq!(stores.len(), 75);
        assert!(stores.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(stores[0].0, 0x1_0000);
        assert_eq!(stores[64].0, 0x1_0100);
        assert_eq!(stores[74].0, 0x1_0128);
    }

    #[test]
    fn test_write_validates_before_bus() {
        let mut engine = engine();
        assert!(matches!(
            engine.write(0x1_0000, &[0u8; 6]),
            Err(Error::InvalidParameter(ParamError::UnalignedLength { len: 6 }))
        ));
        assert!(matches!(
            engine.write(4 * 64 * 1024 - 4, &[0u8; 8]),
            Err(Error::InvalidParameter(ParamError::OutsideWindow { .. }))
        ));
        engine.write(0, &[]).unwrap();
        assert!(engine.bus().ops.is_empty());
    }

    #[test]
    fn test_write_failure_is_unrecoverable() {
        let mut engine = engine();
        // Fail the first store of the second page program
        engine.bus_mut().fail_at = Some(5 + 3 + 64);
        let data = vec![0u8; 512];
        let err = engine.write(0x2_0000, &data).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err,
            Error::Unrecoverable {
                address: 0x2_0100,
                cause: FatalCause::WriteAborted
            }
        );
    }

    #[test]
    fn test_erase_single_block_sequence() {
        let mut engine = engine();
        engine.erase_single_block(0x3_0000).unwrap();
        assert_eq!(
            engine.bus().ops,
            [
                config(0x06, 0x40_0000, REG_CMD_PORT),
                config(0, 0x1, REG_LD_PORT),
                config(0xD8, 0x40_8000, REG_CMD_PORT),
                config(0, 0x3_0000, REG_ADDR_PORT),
                config(0, 0x1, REG_LD_PORT),
            ]
        );
    }

    #[test]
    fn test_erase_single_block_outside_window() {
        let mut engine = engine();
        for addr in [4 * 64 * 1024, 3 * 64 * 1024 + 0x8000, usize::MAX - 0xFFFF] {
            assert!(matches!(
                engine.erase_single_block(addr),
                Err(Error::InvalidParameter(ParamError::OutsideWindow { .. }))
            ));
        }
        assert!(engine.bus().ops.is_empty());
    }

    #[test]
    fn test_erase_length_must_be_whole_units() {
        let mut engine = engine();
        for len in [1usize, 4, 0x8000, 0xFFFF, 0x1_0001, 0x1_8000] {
            assert!(matches!(
                engine.erase(0, len),
                Err(Error::InvalidParameter(ParamError::EraseLengthNotMultiple { .. }))
            ));
        }
        assert!(engine.bus().ops.is_empty());
    }

    #[test]
    fn test_erase_walks_units() {
        let mut engine = engine();
        engine.erase(0x1_0000, 0x3_0000).unwrap();
        let addresses: Vec<u32> = engine
            .bus()
            .ops
            .iter()
            .filter_map(|op| match *op {
                Op::Config {
                    value,
                    offset: REG_ADDR_PORT,
                    ..
                } => Some(value),
                _ => None,
            })
            .collect();
        assert_eq!(addresses, [0x1_0000, 0x2_0000, 0x3_0000]);
    }

    #[test]
    fn test_erase_gives_up_after_retries() {
        let mut engine = engine();
        engine.bus_mut().image[0x1_0010] = 0x00;
        assert_eq!(
            engine.erase(0x1_0000, 0x1_0000),
            Err(Error::Unrecoverable {
                address: 0x1_0000,
                cause: FatalCause::EraseNotCompleted
            })
        );
        assert_eq!(engine.bus().configs(), 5 * NOR_FLASH_ERASE_RETRY as usize);
    }

    #[test]
    fn test_relocate_moves_register_and_window_addresses() {
        let mut engine = engine();
        let maps = [
            OffsetConverter::new(DEFAULT_CONTROLLER_BASE, 0x7000_0000, 0x1000),
            OffsetConverter::new(0, 0x4000_0000, 4 * 64 * 1024),
        ];
        engine.relocate(&ConverterChain(&maps)).unwrap();
        assert_eq!(engine.state(), EngineState::Relocated);
        assert_eq!(engine.controller_base(), 0x7000_0000);
        assert_eq!(engine.window_base(), 0x4000_0000);

        engine.write_chunk(0x40, &[1, 2, 3, 4]).unwrap();
        assert!(engine.bus().stores().contains(&(0x4000_0040, 0x0403_0201)));

        let mut buf = [0u8; 4];
        engine.read(0x100, &mut buf).unwrap();
        assert_eq!(buf, [ERASED_VALUE; 4]);

        assert_eq!(
            engine.relocate(&ConverterChain(&maps)),
            Err(Error::AlreadyRelocated)
        );
    }

    #[test]
    fn test_relocate_requires_initialize() {
        let config = small_config();
        let mut engine = NorFlashEngine::new(RecordingBus::new(&config), config);
        assert_eq!(
            engine.relocate(&crate::relocate::IdentityConverter),
            Err(Error::NotReady)
        );
    }
}

//! Whole-region image transfer

use super::create_progress_bar_with_phase;
use crate::error::{CliError, Result};
use norfvb_core::engine::{ERASED_VALUE, WORD_SIZE};
use norfvb_core::fvb::EraseRange;
use norfvb_core::{FlashBus, FlashFvb};
use std::fs;
use std::path::Path;

/// Read the whole region into `output`
pub fn run_dump<B: FlashBus>(fvb: &mut FlashFvb<B>, output: &Path) -> Result<()> {
    let block_size = fvb.block_size();
    let total = fvb.total_blocks();
    let mut data = vec![0u8; total as usize * block_size];

    let pb = create_progress_bar_with_phase(data.len() as u64, "Reading")?;
    for (lba, block) in data.chunks_mut(block_size).enumerate() {
        fvb.read(lba as u64, 0, block)?;
        pb.inc(block.len() as u64);
    }
    pb.finish_with_message("Read complete");

    fs::write(output, &data)?;
    println!("Wrote {} bytes to {:?}", data.len(), output);
    Ok(())
}

/// Erase and program the region from `input`, block by block
///
/// Blocks past the end of the input are left untouched. Input that is not
/// a whole number of words is padded with erased bytes.
pub fn run_program<B: FlashBus>(fvb: &mut FlashFvb<B>, input: &Path) -> Result<()> {
    let mut data = fs::read(input)?;
    println!("Read {} bytes from {:?}", data.len(), input);

    let block_size = fvb.block_size();
    let region_size = fvb.total_blocks() as usize * block_size;
    if data.len() > region_size {
        return Err(CliError::InputTooLarge {
            len: data.len(),
            reason: "larger than the flash region",
        });
    }
    let padded = data.len().next_multiple_of(WORD_SIZE);
    data.resize(padded, ERASED_VALUE);

    let pb = create_progress_bar_with_phase(data.len() as u64, "Programming")?;
    let mut skipped = 0usize;
    for (lba, chunk) in data.chunks(block_size).enumerate() {
        let lba = lba as u64;
        fvb.erase_blocks(&[EraseRange::new(lba, 1)])?;
        if chunk.iter().all(|&b| b == ERASED_VALUE) {
            skipped += 1;
        } else {
            fvb.write(lba, 0, chunk)?;
        }
        pb.inc(chunk.len() as u64);
    }
    pb.finish_with_message("Program complete");

    let blocks = data.len().div_ceil(block_size);
    println!(
        "Programmed {} block(s) ({} already blank after erase)",
        blocks, skipped
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::open_fvb;
    use norfvb_core::config::PlatformConfig;

    fn small_config() -> PlatformConfig {
        PlatformConfig {
            region_size: 4 * 64 * 1024,
            ..Default::default()
        }
    }

    #[test]
    fn test_program_then_dump() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("flash.img");
        let input = dir.path().join("input.bin");
        let output = dir.path().join("dump.bin");

        // Odd length forces padding; the second block stays blank
        let mut payload: Vec<u8> = (0..64 * 1024 + 6).map(|i| (i % 251) as u8).collect();
        payload[64 * 1024..].fill(0xFF);
        fs::write(&input, &payload).unwrap();

        let mut fvb = open_fvb(&image, small_config()).unwrap();
        run_program(&mut fvb, &input).unwrap();
        run_dump(&mut fvb, &output).unwrap();

        let dumped = fs::read(&output).unwrap();
        assert_eq!(dumped.len(), 4 * 64 * 1024);
        assert_eq!(&dumped[..payload.len()], &payload[..]);
        assert!(dumped[payload.len()..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_program_rejects_oversized_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.bin");
        fs::write(&input, vec![0u8; 4 * 64 * 1024 + 4]).unwrap();

        let mut fvb = open_fvb(&dir.path().join("flash.img"), small_config()).unwrap();
        assert!(matches!(
            run_program(&mut fvb, &input),
            Err(CliError::InputTooLarge { .. })
        ));
    }
}

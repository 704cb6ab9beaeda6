//! Erase command implementation

use crate::error::Result;
use norfvb_core::fvb::EraseRange;
use norfvb_core::{FlashBus, FlashFvb};

/// Erase every requested range
pub fn run_erase<B: FlashBus>(fvb: &mut FlashFvb<B>, ranges: &[EraseRange]) -> Result<()> {
    let blocks = ranges.iter().map(|r| r.count).fold(0u64, u64::saturating_add);
    println!("Erasing {} block(s) in {} range(s)...", blocks, ranges.len());

    fvb.erase_blocks(ranges)?;

    for range in ranges {
        println!(
            "  LBA {}..{} erased",
            range.lba,
            range.lba.saturating_add(range.count).saturating_sub(1)
        );
    }
    Ok(())
}

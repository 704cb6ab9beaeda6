//! Write command implementation

use crate::error::Result;
use norfvb_core::{FlashBus, FlashFvb};
use std::fs;
use std::path::Path;

/// Program the contents of `input` at `offset` inside block `lba`
///
/// The target range must already be erased; nothing is erased here.
pub fn run_write<B: FlashBus>(
    fvb: &mut FlashFvb<B>,
    lba: u64,
    offset: usize,
    input: &Path,
) -> Result<()> {
    let data = fs::read(input)?;
    println!("Read {} bytes from {:?}", data.len(), input);

    fvb.write(lba, offset, &data)?;
    println!(
        "Wrote {} bytes to block {} at offset 0x{:X}",
        data.len(),
        lba,
        offset
    );
    Ok(())
}

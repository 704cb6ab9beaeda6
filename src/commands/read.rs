//! Read command implementation

use crate::error::Result;
use norfvb_core::{FlashBus, FlashFvb};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Read `length` bytes at `offset` inside block `lba`
pub fn run_read<B: FlashBus>(
    fvb: &mut FlashFvb<B>,
    lba: u64,
    offset: usize,
    length: usize,
    output: Option<&Path>,
) -> Result<()> {
    let mut data = vec![0u8; length];
    fvb.read(lba, offset, &mut data)?;

    match output {
        Some(path) => {
            let mut file = File::create(path)?;
            file.write_all(&data)?;
            println!("Wrote {} bytes to {:?}", data.len(), path);
        }
        None => {
            let base = fvb.get_physical_address() + lba as usize * fvb.block_size() + offset;
            print!("{}", hex_dump(base, &data));
        }
    }
    Ok(())
}

/// Format `data` as 16-byte hex dump lines starting at `base`
fn hex_dump(base: usize, data: &[u8]) -> String {
    let mut out = String::new();
    for (i, line) in data.chunks(16).enumerate() {
        out.push_str(&format!("{:08X}:", base + i * 16));
        for byte in line {
            out.push_str(&format!(" {:02X}", byte));
        }
        for _ in line.len()..16 {
            out.push_str("   ");
        }
        out.push_str("  |");
        out.extend(line.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push_str("|\n");
    }
    out
}

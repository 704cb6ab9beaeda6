//! CLI command implementations
//!
//! Every command runs against the block facade, so the same code paths the
//! firmware uses (LBA checks, attribute gating, chunked programs, erase
//! retries) are exercised from the host.

mod erase;
mod image;
mod info;
mod read;
mod write;

pub use erase::run_erase;
pub use image::{run_dump, run_program};
pub use info::run_info;
pub use read::run_read;
pub use write::run_write;

use crate::error::Result;
use indicatif::{ProgressBar, ProgressStyle};

/// Create a progress bar with custom phase message
fn create_progress_bar_with_phase(total: u64, phase: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                phase
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

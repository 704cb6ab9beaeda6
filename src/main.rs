//! norfvb - Host tool for the NOR flash block device stack
//!
//! Runs the same engine and block facade the firmware uses, on top of the
//! simulated controller in `norfvb-sim`. The simulated chip is backed by an
//! image file that is loaded at start and written back after every command
//! that modifies flash.

mod cli;
mod commands;
mod device;
mod error;

use clap::Parser;
use cli::{Cli, Commands};
use std::process::ExitCode;

/// Exit status when the flash contents are left undefined
const EXIT_FATAL: u8 = 2;

fn main() -> ExitCode {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_fatal() => {
            log::error!("{}", e);
            log::error!("Flash contents are undefined, do not trust the image");
            ExitCode::from(EXIT_FATAL)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> error::Result<()> {
    let config = device::load_config(cli.config.as_deref())?;
    let mut fvb = device::open_fvb(&cli.image, config)?;
    let modifies_flash = cli.command.modifies_flash();

    let result = match &cli.command {
        Commands::Info => {
            commands::run_info(&fvb);
            Ok(())
        }
        Commands::Read {
            lba,
            offset,
            length,
            output,
        } => commands::run_read(&mut fvb, *lba, *offset, *length, output.as_deref()),
        Commands::Write { lba, offset, input } => {
            commands::run_write(&mut fvb, *lba, *offset, input)
        }
        Commands::Erase { ranges } => commands::run_erase(&mut fvb, ranges),
        Commands::Dump { output } => commands::run_dump(&mut fvb, output),
        Commands::Program { input } => commands::run_program(&mut fvb, input),
    };

    // Best-effort erases may have changed flash even when they report an error
    if modifies_flash {
        device::save_image(&fvb, &cli.image)?;
    }
    result
}

//! A flashing tool for the Nordic Secure DFU bootloader, over serial or BLE.

pub mod buttonless;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod package;
pub mod payload;
pub mod protocol;
pub mod slip;
pub mod transport;

pub use error::{DfuError, Result};

use clap::Parser;
use config::{Cli, Config};
use log::LevelFilter;

/// Parses CLI arguments, sets up logging, and runs a complete update.
/// `RUST_LOG` overrides the verbosity derived from `-d/--debug`.
pub fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_cli(cli)?;
    init_logging(config.verbosity);
    driver::run(&config)
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::builder()
        .filter_level(level)
        .parse_default_env()
        .init();
}

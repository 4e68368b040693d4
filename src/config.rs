//! CLI surface and the immutable configuration it produces.
//!
//! Redesigned per spec from the teacher's process-wide mutable options:
//! `Cli::parse()` produces a `Config` once at startup, which is then
//! passed by value/reference to the driver and transport constructors.
//! No module holds mutable global state.

use crate::error::{DfuError, Result};
use crate::transport::ble::AddressType;
use clap::Parser;
use std::path::PathBuf;

const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";
const DEFAULT_BLE_INTERFACE: &str = "hci0";

/// Update firmware on an nRF device running the Secure DFU bootloader.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Serial device path.
    #[arg(short = 'p', long = "port", default_value = DEFAULT_SERIAL_PORT, conflicts_with = "ble")]
    port: String,

    /// BLE target address (mutually exclusive with --port).
    #[arg(short = 'b', long = "ble")]
    ble: Option<String>,

    /// BLE address type.
    #[arg(short = 't', long = "atype", value_enum, default_value_t = AddressTypeArg::Public)]
    atype: AddressTypeArg,

    /// BLE host interface, e.g. hci0.
    #[arg(short = 'i', long = "interface", default_value = DEFAULT_BLE_INTERFACE)]
    interface: String,

    /// Increase verbosity; repeat for more detail (1..4).
    #[arg(short = 'd', long = "debug", action = clap::ArgAction::Count)]
    debug: u8,

    /// Path to the DFU ZIP file.
    zip_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum AddressTypeArg {
    Public,
    Random,
}

impl From<AddressTypeArg> for AddressType {
    fn from(value: AddressTypeArg) -> Self {
        match value {
            AddressTypeArg::Public => AddressType::Public,
            AddressTypeArg::Random => AddressType::Random,
        }
    }
}

/// Where the device is reached: a local serial port, or a BLE address on
/// a given host interface.
#[derive(Debug, Clone)]
pub enum Target {
    Serial { port: String },
    Ble {
        address: String,
        address_type: AddressType,
        interface: String,
    },
}

/// Immutable configuration built once from the parsed CLI arguments.
#[derive(Debug, Clone)]
pub struct Config {
    pub target: Target,
    pub zip_path: PathBuf,
    pub verbosity: u8,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let target = match cli.ble {
            Some(address) => Target::Ble {
                address,
                address_type: cli.atype.into(),
                interface: cli.interface,
            },
            None => Target::Serial { port: cli.port },
        };

        if cli.debug > 4 {
            return Err(DfuError::Package(format!(
                "debug level {} out of range (expected 1..4)",
                cli.debug
            )));
        }

        Ok(Self {
            target,
            zip_path: cli.zip_path,
            verbosity: cli.debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_serial_on_default_port() {
        let cli = Cli::parse_from(["nrfdfu", "firmware.zip"]);
        let config = Config::from_cli(cli).unwrap();
        match config.target {
            Target::Serial { port } => assert_eq!(port, DEFAULT_SERIAL_PORT),
            Target::Ble { .. } => panic!("expected serial target"),
        }
    }

    #[test]
    fn ble_flag_selects_ble_target_with_defaults() {
        let cli = Cli::parse_from(["nrfdfu", "--ble", "AA:BB:CC:DD:EE:FF", "firmware.zip"]);
        let config = Config::from_cli(cli).unwrap();
        match config.target {
            Target::Ble {
                address,
                address_type,
                interface,
            } => {
                assert_eq!(address, "AA:BB:CC:DD:EE:FF");
                assert_eq!(address_type, AddressType::Public);
                assert_eq!(interface, DEFAULT_BLE_INTERFACE);
            }
            Target::Serial { .. } => panic!("expected BLE target"),
        }
    }

    #[test]
    fn atype_random_is_threaded_through() {
        let cli = Cli::parse_from([
            "nrfdfu",
            "--ble",
            "AA:BB:CC:DD:EE:FF",
            "--atype",
            "random",
            "firmware.zip",
        ]);
        let config = Config::from_cli(cli).unwrap();
        match config.target {
            Target::Ble { address_type, .. } => assert_eq!(address_type, AddressType::Random),
            Target::Serial { .. } => panic!("expected BLE target"),
        }
    }

    #[test]
    fn debug_level_above_four_is_rejected() {
        let cli = Cli::parse_from(["nrfdfu", "-ddddd", "firmware.zip"]);
        assert!(Config::from_cli(cli).is_err());
    }

    #[test]
    fn explicit_port_conflicts_with_ble() {
        let result = Cli::try_parse_from([
            "nrfdfu",
            "--ble",
            "AA:BB:CC:DD:EE:FF",
            "--port",
            "/dev/ttyUSB1",
            "firmware.zip",
        ]);
        assert!(result.is_err());
    }
}

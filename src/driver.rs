//! Wires a parsed [`Config`] to a concrete [`Transport`], enters the
//! bootloader over BLE if needed, and drives the [`DfuEngine`] to
//! completion while logging progress.
//!
//! Grounded in the teacher's `run` (top-level entry point), generalized
//! from "always serial" to the `Target` selected by the CLI.

use crate::buttonless::Outcome;
use crate::config::{Config, Target};
use crate::engine::{DfuEngine, Progress};
use crate::error::{DfuError, Result};
use crate::package;
use crate::protocol::ObjectType;
use crate::transport::ble::{AddressType, BleTransport};
use crate::transport::serial::{SerialTransport, DEFAULT_BAUD_RATE};
use crate::transport::Transport;
use btleplug::api::BDAddr;
use std::str::FromStr;
use std::time::Duration;

/// Runs a complete update: reads the package, reaches the bootloader, and
/// streams the init packet and firmware image.
pub fn run(config: &Config) -> Result<()> {
    let zip_path = config
        .zip_path
        .to_str()
        .ok_or_else(|| DfuError::Package("zip path is not valid UTF-8".into()))?;
    let package = package::read(zip_path)?;
    let mut init = package.init;
    let mut firmware = package.firmware;

    match &config.target {
        Target::Serial { port } => {
            let handle = serialport::new(port.as_str(), DEFAULT_BAUD_RATE)
                .timeout(Duration::from_millis(60_000))
                .open()
                .map_err(|e| DfuError::Io(std::io::Error::from(e)))?;
            let mut transport = SerialTransport::new(handle)?;
            run_engine(&mut transport, &mut init, &mut firmware)
        }
        Target::Ble {
            address,
            address_type,
            interface,
        } => {
            let app_address = BDAddr::from_str(address)
                .map_err(|e| DfuError::Package(format!("invalid BLE address '{}': {}", address, e)))?;
            let bootloader_address = enter_bootloader_if_needed(interface, app_address, *address_type)?;
            let mut transport = BleTransport::connect(interface, bootloader_address, *address_type)?;
            run_engine(&mut transport, &mut init, &mut firmware)
        }
    }
}

/// Triggers Buttonless DFU mode and returns the address the bootloader
/// will advertise at. Only falls through to the unchanged address when
/// `enter_bootloader` reports the device has no Buttonless characteristic
/// (spec §4.5: "target is already in DFU mode"); every other failure
/// (no adapter, scan/connect failure, indication timeout or mismatch) is
/// a real fault and propagates.
fn enter_bootloader_if_needed(_interface: &str, app_address: BDAddr, _address_type: AddressType) -> Result<BDAddr> {
    match crate::buttonless::enter_bootloader(app_address)? {
        Outcome::Triggered => {
            log::info!("triggered buttonless DFU, reconnecting at bootloader address");
            Ok(crate::transport::ble::bootloader_address(app_address))
        }
        Outcome::AlreadyInBootloader => {
            log::debug!("no buttonless characteristic, assuming device is already in bootloader mode");
            Ok(app_address)
        }
    }
}

fn run_engine(transport: &mut impl Transport, init: &mut dyn crate::payload::Payload, firmware: &mut dyn crate::payload::Payload) -> Result<()> {
    let init_len = init.len();
    let firmware_len = firmware.len();
    let mut engine = DfuEngine::new(transport);
    engine.run(init, firmware, |progress: Progress| {
        let label = match progress.object_type {
            ObjectType::Command => "init packet",
            ObjectType::Data => "firmware",
        };
        log::info!(
            "{}: {}/{} bytes",
            label,
            progress.bytes_sent,
            progress.total_bytes
        );
    })?;
    log::info!(
        "update complete: init packet {} bytes, firmware {} bytes",
        init_len,
        firmware_len
    );
    Ok(())
}

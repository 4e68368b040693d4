//! Buttonless DFU BLE entry: tells a running application to reboot into
//! its Secure DFU bootloader, which then advertises at an address one
//! greater than the application's (see `transport::ble::bootloader_address`).
//!
//! Grounded in `lxndrd-nrfdfu-ble::protocol::dfu_trigger` and
//! `standarddeviant-nrfdfu-ble`'s inline buttonless handling in
//! `DfuTransportBtleplug::new`: subscribe to the Buttonless characteristic,
//! write `0x01`, and wait for the `[0x20, 0x01, 0x01]` success indication.

use crate::error::{DfuError, Result};
use crate::transport::ble::uuids;
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::api::BDAddr;
use futures::stream::StreamExt;
use std::time::Duration;

const TRIGGER_TIMEOUT: Duration = Duration::from_secs(10);

/// The indication payload the bootloader-trigger write is acknowledged
/// with: `0x20` (response header), `0x01` (opcode echo), `0x01` (success).
const TRIGGER_SUCCESS: [u8; 3] = [0x20, 0x01, 0x01];

/// Distinguishes "the device doesn't expose a Buttonless characteristic,
/// so it must already be sitting in bootloader mode" (spec §4.5) from
/// every other failure, which is fatal and must propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Triggered,
    AlreadyInBootloader,
}

/// Connects to `address` and, if it exposes a Buttonless characteristic,
/// writes the trigger and waits for the device to confirm it is
/// rebooting into the bootloader. Does not wait for the device to finish
/// rebooting; the caller is expected to retry connecting at
/// `transport::ble::bootloader_address(address)` after `Triggered`.
///
/// Returns `Ok(Outcome::AlreadyInBootloader)` only when the Buttonless
/// characteristic is absent after a successful connect and service
/// discovery; every other failure (no adapter, scan/connect failure,
/// indication timeout, unexpected indication payload) is returned as an
/// `Err` and must not be treated as "already in bootloader mode".
pub fn enter_bootloader(address: BDAddr) -> Result<Outcome> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(DfuError::Io)?;
    runtime.block_on(trigger(address))
}

async fn trigger(address: BDAddr) -> Result<Outcome> {
    let manager = btleplug::platform::Manager::new().await.map_err(io_err)?;
    let central = manager
        .adapters()
        .await
        .map_err(io_err)?
        .into_iter()
        .next()
        .ok_or_else(|| not_found("no BLE adapter"))?;

    central.start_scan(ScanFilter::default()).await.map_err(io_err)?;
    let mut events = central.events().await.map_err(io_err)?;
    let peripheral = loop {
        match events.next().await {
            Some(CentralEvent::DeviceDiscovered(id)) => {
                let candidate = central.peripheral(&id).await.map_err(io_err)?;
                if let Some(props) = candidate.properties().await.map_err(io_err)? {
                    if props.address == address {
                        central.stop_scan().await.map_err(io_err)?;
                        break candidate;
                    }
                }
            }
            Some(_) => continue,
            None => return Err(not_found("scan ended before target address was found")),
        }
    };

    peripheral.connect().await.map_err(io_err)?;
    peripheral.discover_services().await.map_err(io_err)?;

    let buttonless = match find_characteristic(&peripheral, uuids::BUTTONLESS) {
        Some(c) => c,
        None => {
            let _ = peripheral.disconnect().await;
            return Ok(Outcome::AlreadyInBootloader);
        }
    };

    peripheral.subscribe(&buttonless).await.map_err(io_err)?;
    let mut notifications = peripheral.notifications().await.map_err(io_err)?;

    peripheral
        .write(&buttonless, &[0x01], WriteType::WithResponse)
        .await
        .map_err(io_err)?;

    let indication = tokio::time::timeout(TRIGGER_TIMEOUT, async {
        loop {
            match notifications.next().await {
                Some(event) if event.uuid == uuids::BUTTONLESS => return Some(event.value),
                Some(_) => continue,
                None => return None,
            }
        }
    })
    .await
    .map_err(|_| DfuError::Timeout)?
    .ok_or_else(|| not_found("buttonless indication channel closed"))?;

    if indication != TRIGGER_SUCCESS {
        return Err(DfuError::Framing(format!(
            "unexpected buttonless trigger response: {:?}",
            indication
        )));
    }

    let _ = peripheral.disconnect().await;
    Ok(Outcome::Triggered)
}

fn find_characteristic(peripheral: &btleplug::platform::Peripheral, uuid: uuid::Uuid) -> Option<Characteristic> {
    peripheral.characteristics().into_iter().find(|c| c.uuid == uuid)
}

fn not_found(message: &str) -> DfuError {
    DfuError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, message.to_string()))
}

fn io_err(e: btleplug::Error) -> DfuError {
    DfuError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

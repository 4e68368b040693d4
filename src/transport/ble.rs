//! BLE GATT transport: writes to the Control Point characteristic,
//! correlates notifications through a single-slot rendezvous, and writes
//! firmware chunks to the Data Point characteristic without response.
//!
//! Grounded in `lxndrd-nrfdfu-ble`/`standarddeviant-nrfdfu-ble`'s
//! `btleplug`-based transport, adapted from their async API to the
//! engine's single-threaded blocking-with-timeout contract: a worker
//! thread owns a small Tokio runtime and the `btleplug` peripheral, and
//! exchanges requests/responses with the engine's thread over a command
//! channel and a `Mutex`+`Condvar` rendezvous slot (spec's redesign note:
//! "single-slot rendezvous owned by the transport").

use crate::error::{DfuError, Result};
use crate::protocol::Response;
use crate::transport::Transport;
use btleplug::api::{BDAddr, Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use uuid::Uuid;

/// nRF Secure DFU GATT service and characteristics
/// (<https://infocenter.nordicsemi.com/topic/sdk_nrf5_v17.1.0/group__nrf__dfu__ble.html>).
pub mod uuids {
    use uuid::Uuid;

    pub const SERVICE: Uuid = Uuid::from_u128(0x0000FE59_0000_1000_8000_00805F9B34FB);
    pub const CONTROL: Uuid = Uuid::from_u128(0x8EC90001_F315_4F60_9FB8_838830DAEA50);
    pub const DATA: Uuid = Uuid::from_u128(0x8EC90002_F315_4F60_9FB8_838830DAEA50);
    pub const BUTTONLESS: Uuid = Uuid::from_u128(0x8EC90003_F315_4F60_9FB8_838830DAEA50);
}

/// nRF's default GATT MTU for the DFU data characteristic when the host
/// stack does not expose live MTU discovery (`btleplug` does not, as of
/// this writing). A 3-byte safety margin is subtracted for the ATT
/// write-command header, per spec's resolved Open Question.
const DEFAULT_BLE_MTU: u16 = 247;
const ATT_HEADER_MARGIN: u16 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Public,
    Random,
}

enum WorkerOp {
    WriteControl(Vec<u8>),
    WriteData(Vec<u8>),
    Close,
}

type Rendezvous = Arc<(Mutex<Option<Response>>, Condvar)>;

pub struct BleTransport {
    ops: std_mpsc::Sender<WorkerOp>,
    acks: std_mpsc::Receiver<Result<()>>,
    rendezvous: Rendezvous,
    worker: Option<JoinHandle<()>>,
    att_mtu: u16,
}

impl BleTransport {
    /// Connects to `address` on the given host adapter/interface and
    /// discovers the DFU control and data characteristics. `interface` is
    /// presently informational (the first adapter reported by the host
    /// stack is used, matching `btleplug`'s single-adapter-by-default
    /// idiom); it is threaded through so a future multi-adapter host can
    /// select on it.
    pub fn connect(interface: &str, address: BDAddr, address_type: AddressType) -> Result<Self> {
        let _ = (interface, address_type); // see doc comment above
        let (op_tx, op_rx) = std_mpsc::channel::<WorkerOp>();
        let (ack_tx, ack_rx) = std_mpsc::channel::<Result<()>>();
        let rendezvous: Rendezvous = Arc::new((Mutex::new(None), Condvar::new()));
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();

        let worker_rendezvous = rendezvous.clone();
        let worker = std::thread::Builder::new()
            .name("nrfdfu-ble".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(DfuError::Io(e)));
                        return;
                    }
                };
                runtime.block_on(run_worker(address, worker_rendezvous, op_rx, ack_tx, ready_tx));
            })
            .expect("failed to spawn BLE worker thread");

        ready_rx.recv().map_err(|_| DfuError::Cancelled)??;

        Ok(Self {
            ops: op_tx,
            acks: ack_rx,
            rendezvous,
            worker: Some(worker),
            att_mtu: DEFAULT_BLE_MTU - ATT_HEADER_MARGIN,
        })
    }
}

async fn run_worker(
    address: BDAddr,
    rendezvous: Rendezvous,
    op_rx: std_mpsc::Receiver<WorkerOp>,
    ack_tx: std_mpsc::Sender<Result<()>>,
    ready_tx: std_mpsc::Sender<Result<()>>,
) {
    let peripheral = match connect_peripheral(address).await {
        Ok(p) => p,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let control = match find_characteristic(&peripheral, uuids::CONTROL) {
        Ok(c) => c,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let data = match find_characteristic(&peripheral, uuids::DATA) {
        Ok(c) => c,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = peripheral.subscribe(&control).await {
        let _ = ready_tx.send(Err(io_err(e)));
        return;
    }

    let mut notifications = match peripheral.notifications().await {
        Ok(n) => n,
        Err(e) => {
            let _ = ready_tx.send(Err(io_err(e)));
            return;
        }
    };

    let _ = ready_tx.send(Ok(()));

    // Forward every notification on the control characteristic into the
    // single-slot rendezvous; spurious notifications on other
    // characteristics are logged and discarded.
    let notify_control = control.uuid;
    let notify_rendezvous = rendezvous.clone();
    tokio::spawn(async move {
        while let Some(event) = notifications.next().await {
            if event.uuid != notify_control {
                log::debug!("discarding notification on unexpected characteristic {}", event.uuid);
                continue;
            }
            match crate::protocol::parse_response(&event.value) {
                Ok(response) => {
                    let (lock, cvar) = &*notify_rendezvous;
                    let mut slot = lock.lock().unwrap();
                    *slot = Some(response);
                    cvar.notify_one();
                }
                Err(e) => log::warn!("discarding malformed notification: {}", e),
            }
        }
    });

    // Serve write requests from the engine thread until told to close.
    while let Ok(op) = op_rx.recv() {
        let result = match op {
            WorkerOp::WriteControl(bytes) => peripheral
                .write(&control, &bytes, WriteType::WithResponse)
                .await
                .map_err(io_err),
            WorkerOp::WriteData(bytes) => peripheral
                .write(&data, &bytes, WriteType::WithoutResponse)
                .await
                .map_err(io_err),
            WorkerOp::Close => {
                let _ = peripheral.disconnect().await;
                break;
            }
        };
        if ack_tx.send(result).is_err() {
            break;
        }
    }
}

async fn connect_peripheral(address: BDAddr) -> Result<Peripheral> {
    let manager = Manager::new().await.map_err(io_err)?;
    let adapters = manager.adapters().await.map_err(io_err)?;
    let central: Adapter = adapters
        .into_iter()
        .next()
        .ok_or_else(|| DfuError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "no BLE adapter")))?;

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
            None => {
                return Err(DfuError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "scan ended before target address was found",
                )))
            }
        }
    };

    peripheral.connect().await.map_err(io_err)?;
    peripheral.discover_services().await.map_err(io_err)?;
    Ok(peripheral)
}

fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Result<Characteristic> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
        .ok_or_else(|| {
            DfuError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("characteristic {} not found", uuid),
            ))
        })
}

fn io_err(e: btleplug::Error) -> DfuError {
    DfuError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

/// Nordic's convention for hopping from a running application's address
/// into its bootloader-mode address: the most-significant address byte is
/// incremented by one (with wraparound), and all lower bytes are unchanged.
/// Goes through the string form since that's the only stable `BDAddr`
/// surface (`Display`/`FromStr`, as used for address parsing throughout
/// the pack's `btleplug` transports).
pub fn bootloader_address(addr: BDAddr) -> BDAddr {
    use std::str::FromStr;

    let text = addr.to_string();
    let mut octets: Vec<u8> = text
        .split(':')
        .map(|h| u8::from_str_radix(h, 16).expect("BDAddr always formats as colon-separated hex octets"))
        .collect();
    octets[0] = octets[0].wrapping_add(1);
    let formatted = octets
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":");
    BDAddr::from_str(&formatted).expect("reformatted address is always valid")
}

impl Transport for BleTransport {
    fn write_control(&mut self, bytes: &[u8]) -> Result<()> {
        self.ops
            .send(WorkerOp::WriteControl(bytes.to_vec()))
            .map_err(|_| DfuError::Cancelled)?;
        self.acks.recv().map_err(|_| DfuError::Cancelled)?
    }

    fn read_control(&mut self, timeout: Duration) -> Result<Response> {
        let (lock, cvar) = &*self.rendezvous;
        let mut slot = lock.lock().unwrap();
        *slot = None;
        loop {
            if let Some(response) = slot.take() {
                return Ok(response);
            }
            let (guard, result) = cvar.wait_timeout(slot, timeout).unwrap();
            slot = guard;
            if result.timed_out() && slot.is_none() {
                return Err(DfuError::Timeout);
            }
        }
    }

    fn write_data(&mut self, bytes: &[u8]) -> Result<()> {
        self.ops
            .send(WorkerOp::WriteData(bytes.to_vec()))
            .map_err(|_| DfuError::Cancelled)?;
        self.acks.recv().map_err(|_| DfuError::Cancelled)?
    }

    fn close(&mut self) -> Result<()> {
        let _ = self.ops.send(WorkerOp::Close);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        Ok(())
    }

    fn negotiate_mtu(&mut self, _timeout: Duration) -> Result<(u16, usize)> {
        // BLE bypasses the protocol-level `MtuGet` opcode entirely: the
        // data-channel write size is the ATT MTU the host stack already
        // negotiated at connect time, already reduced by the ATT header
        // margin, with no SLIP-style escaping to account for.
        let mtu = self.att_mtu();
        Ok((mtu, mtu as usize))
    }
}

impl BleTransport {
    /// The negotiated ATT write size for the data characteristic, already
    /// reduced by the ATT header margin. BLE bypasses the protocol-level
    /// `MtuGet` opcode entirely: the GATT MTU is a host-stack property.
    pub fn att_mtu(&self) -> u16 {
        self.att_mtu
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootloader_address_increments_msb_with_wraparound() {
        use std::str::FromStr;
        let addr = BDAddr::from_str("FF:02:03:04:05:06").unwrap();
        let hopped = bootloader_address(addr);
        assert_eq!(hopped.to_string(), "00:02:03:04:05:06");
    }

    #[test]
    fn default_att_mtu_accounts_for_header_margin() {
        assert_eq!(DEFAULT_BLE_MTU - ATT_HEADER_MARGIN, 244);
    }
}

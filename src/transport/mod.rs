//! The transport capability: a byte-oriented request/response channel for
//! control traffic and a write-only channel for data traffic, with
//! notifications arriving asynchronously on the control channel.
//!
//! Two implementations exist: [`serial::SerialTransport`] (SLIP framing
//! over a serial port) and [`ble::BleTransport`] (BLE GATT over
//! `btleplug`). The engine (`crate::engine`) only ever depends on the
//! [`Transport`] trait, never on a concrete transport.

pub mod ble;
pub mod serial;

use crate::error::Result;
use crate::protocol::{self, Response};
use std::time::Duration;

/// Default control-response deadline, per spec: a response or notification
/// must arrive within this window or the wait fails with `Timeout`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Capability abstraction over the two wire transports. All methods are
/// blocking: `read_control` parks the calling thread until a complete
/// response has arrived or `timeout` has elapsed.
pub trait Transport {
    /// Sends a control request. Does not wait for a response.
    fn write_control(&mut self, bytes: &[u8]) -> Result<()>;

    /// Blocks until a complete control response has arrived, or `timeout`
    /// elapses.
    fn read_control(&mut self, timeout: Duration) -> Result<Response>;

    /// Sends one chunk on the data channel. Fire-and-forget: no response
    /// is expected or waited for.
    fn write_data(&mut self, bytes: &[u8]) -> Result<()>;

    /// Releases the transport. Any in-flight `read_control` wait aborts
    /// with `Cancelled`.
    fn close(&mut self) -> Result<()>;

    /// Negotiates the session MTU and returns it alongside the
    /// resulting data-channel chunk size. The default implementation
    /// issues the protocol-level `MtuGet` request (the serial path);
    /// `BleTransport` overrides this to query the GATT MTU directly from
    /// the host stack instead, per spec.
    fn negotiate_mtu(&mut self, timeout: Duration) -> Result<(u16, usize)> {
        self.write_control(&protocol::encode_mtu_get())?;
        let response = self.read_control(timeout)?;
        let mtu = protocol::parse_mtu_get(&response)?;
        Ok((mtu, serial_chunk_size(mtu)))
    }
}

/// Worst-case SLIP escaping doubles a chunk's on-wire size, and one byte
/// each is reserved for the `Write` opcode prefix and the frame
/// terminator; `(mtu - 2) / 2` is a safe lower bound for the chunk size
/// that still fits after escaping, per spec.
pub fn serial_chunk_size(mtu: u16) -> usize {
    ((mtu.saturating_sub(2)) / 2).max(1) as usize
}

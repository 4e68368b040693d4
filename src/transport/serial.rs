//! Serial transport: SLIP-framed control requests/responses and
//! fire-and-forget framed data writes, over a blocking `serialport` handle.
//!
//! Grounded in the teacher's `BootloaderConnection`: one control request is
//! outstanding at a time, responses are correlated by the opcode echoed in
//! the frame (no sequence numbers), and the serial port's own read timeout
//! doubles as the control-response deadline.

use crate::error::DfuError;
use crate::protocol::{self, Response, WRITE_OPCODE};
use crate::slip;
use crate::transport::Transport;
use serialport::SerialPort;
use std::io;
use std::time::Duration;

/// Default baud rate used when the CLI does not override it.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    encode_buf: Vec<u8>,
    decode_buf: Vec<u8>,
}

impl SerialTransport {
    pub fn new(mut port: Box<dyn SerialPort>) -> crate::error::Result<Self> {
        // On Windows (and some USB-CDC stacks), the bootloader will not
        // respond until DTR is asserted, otherwise communication fails
        // with timeouts or hangs indefinitely.
        port.write_data_terminal_ready(true)
            .map_err(|e| DfuError::Io(io::Error::from(e)))?;
        Ok(Self {
            port,
            encode_buf: Vec::new(),
            decode_buf: Vec::new(),
        })
    }

    fn write_framed(&mut self, payload: &[u8]) -> crate::error::Result<()> {
        self.encode_buf.clear();
        slip::encode_frame(payload, &mut self.encode_buf);
        self.port.write_all(&self.encode_buf)?;
        self.port.flush()?;
        Ok(())
    }
}

impl Transport for SerialTransport {
    fn write_control(&mut self, bytes: &[u8]) -> crate::error::Result<()> {
        self.write_framed(bytes)
    }

    fn read_control(&mut self, timeout: Duration) -> crate::error::Result<Response> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| DfuError::Io(io::Error::from(e)))?;
        self.decode_buf.clear();
        match slip::decode_frame(&mut self.port, &mut self.decode_buf) {
            Ok(()) => protocol::parse_response(&self.decode_buf),
            Err(DfuError::Io(e)) if is_timeout(&e) => Err(DfuError::Timeout),
            Err(e) => Err(e),
        }
    }

    fn write_data(&mut self, bytes: &[u8]) -> crate::error::Result<()> {
        let mut payload = Vec::with_capacity(bytes.len() + 1);
        payload.push(WRITE_OPCODE);
        payload.extend_from_slice(bytes);
        self.write_framed(&payload)
    }

    fn close(&mut self) -> crate::error::Result<()> {
        // `serialport` handles release the OS handle on drop; nothing
        // further to flush, since every write above is already flushed.
        Ok(())
    }
}

fn is_timeout(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::TimedOut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Opcode;
    use std::io::{Cursor, Read};

    /// A loopback `Read + Write` that lets tests drive `decode_frame`
    /// without an actual serial port.
    struct Loopback {
        data: Cursor<Vec<u8>>,
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.data.read(buf)
        }
    }

    #[test]
    fn write_framed_escapes_terminator_byte() {
        let mut buf = Vec::new();
        slip::encode_frame(&[Opcode::Ping as u8, 0xC0], &mut buf);
        // 0xC0 in the payload must be escaped, so the only literal 0xC0 is
        // the trailing terminator.
        assert_eq!(buf.iter().filter(|&&b| b == 0xC0).count(), 1);
        assert_eq!(*buf.last().unwrap(), 0xC0);
    }

    #[test]
    fn decode_frame_over_loopback_reader() {
        let mut framed = Vec::new();
        slip::encode_frame(&[0x60, Opcode::Ping as u8, 0x01, 0x07], &mut framed);
        let mut loopback = Loopback {
            data: Cursor::new(framed),
        };
        let mut out = Vec::new();
        slip::decode_frame(&mut loopback, &mut out).unwrap();
        let response = protocol::parse_response(&out).unwrap();
        assert_eq!(response.opcode, Opcode::Ping as u8);
        assert_eq!(response.result, 0x01);
        assert_eq!(response.payload, vec![0x07]);
    }
}

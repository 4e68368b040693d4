//! Typed request/response layer on top of [`crate::transport::Transport`].
//!
//! Encodes each logical operation to its opcode and parameters, and parses
//! the bootloader's `0x60 <opcode> <result> <payload>` response frame into
//! a typed outcome. This is the layer the engine (`crate::engine`) talks
//! to; it never touches raw bytes itself.

use crate::error::{DfuError, ServerErrorKind};
use byteorder::{ByteOrder, LittleEndian};

/// DFU object kind, mirrored between client and bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectType {
    Command = 0x01,
    Data = 0x02,
}

/// Opcodes understood by the nRF secure DFU bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Create = 0x01,
    SetPrn = 0x02,
    CalcCrc = 0x03,
    Execute = 0x04,
    Select = 0x06,
    MtuGet = 0x07,
    Write = 0x08,
    Ping = 0x09,
}

/// A fully decoded response, as returned by `Transport::read_control`.
#[derive(Debug, Clone)]
pub struct Response {
    pub opcode: u8,
    pub result: u8,
    pub payload: Vec<u8>,
}

const RESPONSE_HEADER: u8 = 0x60;
const RESULT_SUCCESS: u8 = 0x01;

/// Parses a raw response frame (after framing/escaping has already been
/// removed) into a [`Response`]. Both transports share this: the header
/// format is identical on serial and BLE, only the byte channel differs.
pub fn parse_response(bytes: &[u8]) -> Result<Response, DfuError> {
    if bytes.len() < 3 || bytes[0] != RESPONSE_HEADER {
        return Err(DfuError::ProtocolDesync {
            expected: RESPONSE_HEADER,
            actual: bytes.first().copied().unwrap_or(0),
        });
    }
    Ok(Response {
        opcode: bytes[1],
        result: bytes[2],
        payload: bytes[3..].to_vec(),
    })
}

/// Verifies that `response` echoes `expected_opcode` and carries a success
/// result code; otherwise returns the appropriate fatal error.
fn check(response: &Response, expected_opcode: Opcode) -> Result<(), DfuError> {
    let expected = expected_opcode as u8;
    if response.opcode != expected {
        return Err(DfuError::ProtocolDesync {
            expected,
            actual: response.opcode,
        });
    }
    if response.result != RESULT_SUCCESS {
        return Err(DfuError::Server(ServerErrorKind::from_code(response.result)));
    }
    Ok(())
}

/// Result of a `Select` request: the server's per-object-type chunk size
/// and the offset/CRC of whatever it has already staged for that type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectResult {
    pub max_size: u32,
    pub offset: u32,
    pub crc: u32,
}

/// Result of a `CalcCrc` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcResult {
    pub offset: u32,
    pub crc: u32,
}

pub fn encode_ping(id: u8) -> Vec<u8> {
    vec![Opcode::Ping as u8, id]
}

pub fn parse_ping(response: &Response) -> Result<u8, DfuError> {
    check(response, Opcode::Ping)?;
    response
        .payload
        .first()
        .copied()
        .ok_or(DfuError::ProtocolDesync {
            expected: Opcode::Ping as u8,
            actual: response.opcode,
        })
}

pub fn encode_set_prn(prn: u16) -> Vec<u8> {
    let mut buf = vec![Opcode::SetPrn as u8];
    let mut le = [0u8; 2];
    LittleEndian::write_u16(&mut le, prn);
    buf.extend_from_slice(&le);
    buf
}

pub fn parse_set_prn(response: &Response) -> Result<(), DfuError> {
    check(response, Opcode::SetPrn)
}

pub fn encode_mtu_get() -> Vec<u8> {
    vec![Opcode::MtuGet as u8]
}

pub fn parse_mtu_get(response: &Response) -> Result<u16, DfuError> {
    check(response, Opcode::MtuGet)?;
    if response.payload.len() < 2 {
        return Err(DfuError::ProtocolDesync {
            expected: Opcode::MtuGet as u8,
            actual: response.opcode,
        });
    }
    Ok(LittleEndian::read_u16(&response.payload[0..2]))
}

pub fn encode_select(object_type: ObjectType) -> Vec<u8> {
    vec![Opcode::Select as u8, object_type as u8]
}

pub fn parse_select(response: &Response) -> Result<SelectResult, DfuError> {
    check(response, Opcode::Select)?;
    if response.payload.len() < 12 {
        return Err(DfuError::ProtocolDesync {
            expected: Opcode::Select as u8,
            actual: response.opcode,
        });
    }
    Ok(SelectResult {
        max_size: LittleEndian::read_u32(&response.payload[0..4]),
        offset: LittleEndian::read_u32(&response.payload[4..8]),
        crc: LittleEndian::read_u32(&response.payload[8..12]),
    })
}

pub fn encode_create(object_type: ObjectType, size: u32) -> Vec<u8> {
    let mut buf = vec![Opcode::Create as u8, object_type as u8];
    let mut le = [0u8; 4];
    LittleEndian::write_u32(&mut le, size);
    buf.extend_from_slice(&le);
    buf
}

pub fn parse_create(response: &Response) -> Result<(), DfuError> {
    check(response, Opcode::Create)
}

pub fn encode_calc_crc() -> Vec<u8> {
    vec![Opcode::CalcCrc as u8]
}

pub fn parse_calc_crc(response: &Response) -> Result<CrcResult, DfuError> {
    check(response, Opcode::CalcCrc)?;
    if response.payload.len() < 8 {
        return Err(DfuError::ProtocolDesync {
            expected: Opcode::CalcCrc as u8,
            actual: response.opcode,
        });
    }
    Ok(CrcResult {
        offset: LittleEndian::read_u32(&response.payload[0..4]),
        crc: LittleEndian::read_u32(&response.payload[4..8]),
    })
}

pub fn encode_execute() -> Vec<u8> {
    vec![Opcode::Execute as u8]
}

pub fn parse_execute(response: &Response) -> Result<(), DfuError> {
    check(response, Opcode::Execute)
}

/// Data-channel writes carry no opcode prefix and no correlated response;
/// the caller hands the raw chunk straight to `Transport::write_data`.
pub const WRITE_OPCODE: u8 = Opcode::Write as u8;

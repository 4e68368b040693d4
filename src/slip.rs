//! Byte-stuffing framer for the serial transport.
//!
//! Each control frame is terminated by a single `0xC0` byte. Within the
//! payload, `0xC0` is escaped as `0xDB 0xDC` and `0xDB` as `0xDB 0xDD`,
//! matching the SLIP-style escaping the Nordic serial DFU protocol layers
//! its length/type headers on top of.

use crate::error::DfuError;
use std::io::Read;

const END: u8 = 0xC0;
const ESC: u8 = 0xDB;
const ESC_END: u8 = 0xDC;
const ESC_ESC: u8 = 0xDD;

/// Appends the SLIP-framed encoding of `payload` to `out`, including the
/// trailing terminator.
pub fn encode_frame(payload: &[u8], out: &mut Vec<u8>) {
    for &byte in payload {
        match byte {
            END => {
                out.push(ESC);
                out.push(ESC_END);
            }
            ESC => {
                out.push(ESC);
                out.push(ESC_ESC);
            }
            other => out.push(other),
        }
    }
    out.push(END);
}

/// Reads bytes from `reader` one at a time until a complete frame has been
/// decoded, appending the unescaped payload to `out`. On a malformed
/// escape sequence, returns [`DfuError::Framing`] after consuming bytes up
/// to and including the next terminator, so the stream resynchronizes for
/// the following call.
pub fn decode_frame(reader: &mut impl Read, out: &mut Vec<u8>) -> Result<(), DfuError> {
    let mut byte = [0u8; 1];
    let mut escaped = false;
    let mut error: Option<String> = None;

    loop {
        reader.read_exact(&mut byte)?;
        let b = byte[0];

        if escaped {
            escaped = false;
            match b {
                ESC_END => out.push(END),
                ESC_ESC => out.push(ESC),
                other => {
                    if error.is_none() {
                        error = Some(format!("invalid escape sequence 0x{:02x} 0x{:02x}", ESC, other));
                    }
                }
            }
            continue;
        }

        match b {
            END => break,
            ESC => escaped = true,
            other => out.push(other),
        }
    }

    match error {
        Some(message) => Err(DfuError::Framing(message)),
        None => Ok(()),
    }
}

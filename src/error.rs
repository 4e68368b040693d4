//! Error taxonomy for the DFU engine and its collaborators.
//!
//! Every fallible operation in this crate returns [`DfuError`]. The engine
//! itself only ever recovers from [`DfuError::CrcMismatch`] (by retrying
//! the current object) and from a resumable [`DfuError::Server`] at
//! session start (by falling back to a fresh object); every other variant
//! is fatal and propagates to the driver, which logs it and exits nonzero.

use std::io;

/// Top-level error type returned by every public operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum DfuError {
    /// A transport read or write failed at the I/O layer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No response arrived within the configured deadline.
    #[error("timed out waiting for a response")]
    Timeout,

    /// A serial frame could not be decoded (bad escape sequence). The
    /// decoder resynchronizes at the next frame terminator; this error is
    /// only fatal once a retry threshold is exceeded.
    #[error("framing error: {0}")]
    Framing(String),

    /// The opcode echoed in a response did not match the request that was
    /// sent, or the response payload was too short for its opcode.
    #[error("protocol desync: expected opcode 0x{expected:02x}, got 0x{actual:02x}")]
    ProtocolDesync { expected: u8, actual: u8 },

    /// The bootloader answered with a non-success result code.
    #[error("bootloader reported an error: {0}")]
    Server(#[from] ServerErrorKind),

    /// `CalcCrc` returned an offset or CRC that did not match what the
    /// client expected after a burst.
    #[error(
        "CRC mismatch: expected (offset={expected_offset}, crc={expected_crc:08x}), \
         got (offset={actual_offset}, crc={actual_crc:08x})"
    )]
    CrcMismatch {
        expected_offset: u32,
        expected_crc: u32,
        actual_offset: u32,
        actual_crc: u32,
    },

    /// The DFU package (zip/manifest) was missing a member or malformed.
    #[error("invalid DFU package: {0}")]
    Package(String),

    /// The transport was closed while a control-response wait was still
    /// outstanding.
    #[error("operation cancelled: transport was closed")]
    Cancelled,
}

/// Non-success result codes reported by the bootloader in a response,
/// mapped from the single-byte result code per the nRF DFU protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ServerErrorKind {
    #[error("invalid object")]
    InvalidObject,
    #[error("unsupported object type")]
    UnsupportedType,
    #[error("operation not permitted")]
    OperationNotPermitted,
    #[error("operation failed")]
    OperationFailed,
    #[error("insufficient resources")]
    InsufficientResources,
    #[error("extended error (code 0x{0:02x})")]
    ExtendedError(u8),
    #[error("unknown result code 0x{0:02x}")]
    Unknown(u8),
}

impl ServerErrorKind {
    /// Maps a single-byte bootloader result code to an error kind.
    /// `0x01` (Success) is never passed here; callers check for success
    /// before calling this.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x02 => ServerErrorKind::UnsupportedType, // NRF_DFU_RES_CODE_OP_CODE_NOT_SUPPORTED
            0x03 => ServerErrorKind::InvalidObject,   // NRF_DFU_RES_CODE_INVALID_PARAMETER
            0x04 => ServerErrorKind::InsufficientResources,
            0x05 => ServerErrorKind::InvalidObject,
            0x07 => ServerErrorKind::UnsupportedType,
            0x08 => ServerErrorKind::OperationNotPermitted,
            0x0a => ServerErrorKind::OperationFailed,
            0x0b => ServerErrorKind::ExtendedError(code),
            other => ServerErrorKind::Unknown(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DfuError>;

//! Protocol errors

use thiserror::Error;

/// Errors that can occur during meter communication.
///
/// Device return codes are deliberately not represented here as a transport
/// failure: a well-formed response with a nonzero return code resolves as a
/// normal [`Issued`](super::Issued) with `success = false`. The [`Device`]
/// variant only appears when a caller asks for that conversion via
/// [`Issued::require_success`](super::Issued::require_success).
///
/// [`Device`]: ProtocolError::Device
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("Failed to open {device}: {reason}")]
    OpenFailed { device: String, reason: String },

    #[error("Not connected to the meter")]
    NotConnected,

    #[error("Link never became writable")]
    WriteTimeout,

    #[error("Response timeout")]
    Timeout,

    #[error("CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("Meter reported a receive buffer overflow")]
    DeviceOverflow,

    #[error("Meter flagged the request as invalid")]
    DeviceInvalidCommand,

    #[error("Malformed response from the meter")]
    InvalidResponse,

    #[error("Payload too large: {0} bytes (maximum 255)")]
    PayloadTooLarge(usize),

    #[error("Device error {code}: {detail}")]
    Device {
        /// Device return code (first payload byte of the response)
        code: u8,
        /// Diagnostic text from the return-code table
        detail: &'static str,
    },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

//! LCP Serial Protocol
//!
//! Implements the Liquid Controls point-to-point protocol spoken by LCR-II
//! registers: CRC-checked frames over a half-duplex serial link, one request
//! in flight at a time.

pub mod commands;
mod crc;
mod dispatcher;
mod error;
mod frame;
mod link;
pub mod return_codes;
pub mod serial;
pub mod stream;

pub use commands::{MeterCommand, Opcode};
pub use crc::{checksum, crc16_step};
pub use dispatcher::{Dispatcher, Issued, RequestState, SyncFlag};
pub use error::ProtocolError;
pub use frame::{build_frame, try_parse, ParseOutcome, Response, ResponseStatus};
pub use link::{Link, LinkConfig, LinkState};
pub use serial::{clear_buffers, configure_port, list_ports, open_port, PortInfo};
pub use stream::{Channel, SerialChannel};

/// Default baud rate for LCR-II communication
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Default network node address of the meter
pub const DEFAULT_NODE: u8 = 250;

/// Default port address of the local host
pub const DEFAULT_HOST_PORT: u8 = 255;

/// Default deadline for a complete response in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Quiet period on the receive side that ends a frame, in milliseconds.
/// The link has no end-of-message delimiter; a frame is considered complete
/// once its declared length is satisfied and the line has gone idle.
pub const FRAME_QUIET_MS: u64 = 100;

/// Delay between write/open retries in milliseconds
pub const WRITE_RETRY_MS: u64 = 250;

/// Maximum write attempts before giving up with a timeout
pub const MAX_WRITE_ATTEMPTS: u32 = 10;

/// Maximum payload length (the frame length field is a single byte)
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Frame head marker; every frame starts with two of these
pub const FRAME_HEAD: u8 = 0x7E;

/// Seed value for the frame checksum
pub const CRC_SEED: u16 = 0x7E7E;

/// Length of a response header: head (2) + to + from + status + data length
pub const RESPONSE_HEADER_LEN: usize = 6;

/// Length of the CRC trailer
pub const CRC_LEN: usize = 2;

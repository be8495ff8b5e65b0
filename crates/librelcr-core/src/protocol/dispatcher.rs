//! Request dispatching
//!
//! Serializes logical requests into frames, drives them through the link one
//! at a time and resolves each with a decoded response or an error. Exclusive
//! access (`&mut self`) enforces the single-in-flight contract at compile
//! time; concurrent callers share the device behind a mutex, which queues
//! them without ever dropping one.

use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    build_frame, return_codes, Link, Opcode, ProtocolError, Response, DEFAULT_HOST_PORT,
    DEFAULT_NODE,
};

/// Alternating sync byte generator.
///
/// The meter uses the sync byte to detect duplicate/retried frames: a retry
/// of the same logical command carries the same value, a new command toggles
/// it. The first frame after a (re)connect carries the fixed start value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncFlag {
    state: SyncState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SyncState {
    #[default]
    Start,
    High,
    Low,
}

impl SyncFlag {
    /// Sync byte of the first frame after connect
    pub const START: u8 = 0x02;
    /// First alternation value
    pub const HIGH: u8 = 0x01;
    /// Second alternation value
    pub const LOW: u8 = 0x00;

    /// Fresh flag in the start state
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to the start state (call on connect)
    pub fn reset(&mut self) {
        self.state = SyncState::Start;
    }

    /// Sync byte for the next logical command
    pub fn next(&mut self) -> u8 {
        match self.state {
            SyncState::Start => {
                self.state = SyncState::High;
                Self::START
            }
            SyncState::High => {
                self.state = SyncState::Low;
                Self::HIGH
            }
            SyncState::Low => {
                self.state = SyncState::High;
                Self::LOW
            }
        }
    }
}

/// Lifecycle of a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    /// No request has been issued yet
    Idle,
    /// The frame was written, awaiting the response
    Sent,
    /// A response arrived (successful or device-rejected)
    Resolved,
    /// No complete frame arrived within the deadline
    TimedOut,
    /// The link failed underneath the request
    LinkError,
}

/// Terminal outcome of an issued request.
///
/// Transport failures surface as `Err(ProtocolError)`; a well-formed response
/// with a nonzero device return code is still `Ok`, with `success = false`
/// and the mapped diagnostic, so callers always see the response the meter
/// sent.
#[derive(Debug, Clone)]
pub struct Issued {
    /// True if the device return code was 0
    pub success: bool,
    /// Device return code (first payload byte)
    pub return_code: u8,
    /// Diagnostic text for the return code, if documented
    pub reason: Option<&'static str>,
    /// The decoded response frame
    pub response: Response,
}

impl Issued {
    /// Convert a device-rejected outcome into a [`ProtocolError::Device`].
    pub fn require_success(self) -> Result<Response, ProtocolError> {
        if self.success {
            Ok(self.response)
        } else {
            Err(ProtocolError::Device {
                code: self.return_code,
                detail: self.reason.unwrap_or("Unrecognized return code"),
            })
        }
    }
}

/// Drives requests over a [`Link`], one at a time.
pub struct Dispatcher {
    link: Link,
    node: u8,
    host_port: u8,
    sync: SyncFlag,
    last_state: RequestState,
}

impl Dispatcher {
    /// Dispatcher with the default addressing (node 250, host port 255)
    pub fn new(link: Link) -> Self {
        Self::with_address(link, DEFAULT_NODE, DEFAULT_HOST_PORT)
    }

    /// Dispatcher with explicit meter node and host port addresses
    pub fn with_address(link: Link, node: u8, host_port: u8) -> Self {
        Self {
            link,
            node,
            host_port,
            sync: SyncFlag::new(),
            last_state: RequestState::Idle,
        }
    }

    /// Open the link and reset the sync alternation
    pub fn connect(&mut self) -> Result<(), ProtocolError> {
        self.link.connect()?;
        self.sync.reset();
        Ok(())
    }

    /// Close the link
    pub fn disconnect(&mut self) {
        self.link.disconnect();
    }

    /// True if the link is open
    pub fn is_connected(&self) -> bool {
        self.link.is_open()
    }

    /// The underlying link
    pub fn link(&self) -> &Link {
        &self.link
    }

    /// State of the most recent request (diagnostics)
    pub fn last_state(&self) -> RequestState {
        self.last_state
    }

    /// Issue one logical request and await its terminal outcome.
    ///
    /// The frame is built once per call, so write retries of the same command
    /// reuse the same sync byte. Open failures on a closed link retry after
    /// `write_retry_ms` up to `max_write_attempts` times before giving up.
    pub fn issue(&mut self, payload: &[u8]) -> Result<Issued, ProtocolError> {
        // A closed link means this will be the first request after the
        // (re)connect the write path performs.
        if !self.link.is_open() {
            self.sync.reset();
        }

        let frame = build_frame(self.node, self.host_port, self.sync.next(), payload)?;
        self.last_state = RequestState::Sent;

        let retry_delay = Duration::from_millis(self.link.config().write_retry_ms);
        let max_attempts = self.link.config().max_write_attempts;
        let mut attempt = 0;
        loop {
            match self.link.write_frame(&frame) {
                Ok(()) => break,
                Err(e @ ProtocolError::OpenFailed { .. }) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        self.last_state = RequestState::LinkError;
                        return Err(e);
                    }
                    debug!("open failed (attempt {attempt}), retrying: {e}");
                    thread::sleep(retry_delay);
                }
                Err(e) => {
                    self.last_state = RequestState::LinkError;
                    return Err(e);
                }
            }
        }

        match self.link.read_response() {
            Ok(response) => {
                let return_code = response.return_code();
                let reason = return_codes::detail(return_code);
                let success = return_codes::is_success(return_code);
                if !success {
                    warn!(
                        "device returned code {return_code}: {}",
                        reason.unwrap_or("unrecognized")
                    );
                }
                self.last_state = RequestState::Resolved;
                Ok(Issued {
                    success,
                    return_code,
                    reason,
                    response,
                })
            }
            Err(ProtocolError::Timeout) => {
                self.last_state = RequestState::TimedOut;
                Err(ProtocolError::Timeout)
            }
            Err(e) => {
                self.last_state = RequestState::LinkError;
                Err(e)
            }
        }
    }

    /// Issue a request for `opcode` with trailing argument bytes.
    pub fn issue_op(&mut self, opcode: Opcode, args: &[u8]) -> Result<Issued, ProtocolError> {
        let mut payload = Vec::with_capacity(1 + args.len());
        payload.push(opcode.byte());
        payload.extend_from_slice(args);
        self.issue(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_sequence() {
        let mut sync = SyncFlag::new();
        assert_eq!(sync.next(), 0x02);
        assert_eq!(sync.next(), 0x01);
        assert_eq!(sync.next(), 0x00);
        assert_eq!(sync.next(), 0x01);
        assert_eq!(sync.next(), 0x00);
    }

    #[test]
    fn test_sync_never_repeats_for_distinct_commands() {
        let mut sync = SyncFlag::new();
        let mut previous = sync.next();
        for _ in 0..16 {
            let current = sync.next();
            assert_ne!(current, previous);
            previous = current;
        }
    }

    #[test]
    fn test_sync_reset() {
        let mut sync = SyncFlag::new();
        sync.next();
        sync.next();
        sync.reset();
        assert_eq!(sync.next(), SyncFlag::START);
    }

    #[test]
    fn test_initial_request_state() {
        let dispatcher = Dispatcher::new(Link::new(Default::default()));
        assert_eq!(dispatcher.last_state(), RequestState::Idle);
        assert!(!dispatcher.is_connected());
    }
}

//! Link management
//!
//! Owns the physical byte stream to the meter: open/close lifecycle, the
//! writable gate, receive-buffer accumulation and quiet-period frame
//! completion. The transport carries no end-of-message delimiter, so frame
//! boundaries are inferred from the declared length field plus an idle window
//! on the line; this keeps the link tolerant of chunked serial delivery.

use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::{
    frame::{self, ParseOutcome},
    serial::{clear_buffers, configure_port, open_port},
    stream::SerialChannel,
    Channel, ProtocolError, Response, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS, FRAME_QUIET_MS,
    MAX_WRITE_ATTEMPTS, WRITE_RETRY_MS,
};

/// Poll interval while waiting on the line, in milliseconds
const POLL_MS: u64 = 2;

/// Link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Serial device, either a bare name under /dev (e.g. "ttyUSB0") or an
    /// absolute path
    pub device: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Deadline for a complete response in milliseconds
    pub response_timeout_ms: u64,
    /// Quiet period that ends a frame, in milliseconds
    pub quiet_period_ms: u64,
    /// Delay between write retries in milliseconds
    pub write_retry_ms: u64,
    /// Maximum write attempts before `WriteTimeout`
    pub max_write_attempts: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device: "ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            response_timeout_ms: DEFAULT_TIMEOUT_MS,
            quiet_period_ms: FRAME_QUIET_MS,
            write_retry_ms: WRITE_RETRY_MS,
            max_write_attempts: MAX_WRITE_ATTEMPTS,
        }
    }
}

impl LinkConfig {
    /// Full device path ("/dev/..." names pass through unchanged)
    pub fn device_path(&self) -> String {
        if self.device.starts_with('/') {
            self.device.clone()
        } else {
            format!("/dev/{}", self.device)
        }
    }
}

/// Observable link state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkState {
    /// The underlying stream is open
    pub is_open: bool,
    /// The link accepts a new write (no request is outstanding)
    pub can_write: bool,
}

impl LinkState {
    const CLOSED: LinkState = LinkState {
        is_open: false,
        can_write: false,
    };

    const WRITABLE: LinkState = LinkState {
        is_open: true,
        can_write: true,
    };
}

/// Manages the serial connection to a single meter.
pub struct Link {
    channel: Option<Box<dyn Channel>>,
    state: LinkState,
    config: LinkConfig,
    rx_buffer: Vec<u8>,
}

impl Link {
    /// Create a closed link (not yet connected)
    pub fn new(config: LinkConfig) -> Self {
        Self {
            channel: None,
            state: LinkState::CLOSED,
            config,
            rx_buffer: Vec::new(),
        }
    }

    /// Create a link over an already established channel.
    ///
    /// Used by tests and by embeddings that open the transport themselves.
    pub fn with_channel(config: LinkConfig, channel: Box<dyn Channel>) -> Self {
        Self {
            channel: Some(channel),
            state: LinkState::WRITABLE,
            config,
            rx_buffer: Vec::new(),
        }
    }

    /// Link configuration
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Current link state
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// True if the underlying stream is open
    pub fn is_open(&self) -> bool {
        self.state.is_open
    }

    /// Open the underlying byte stream.
    ///
    /// Does not retry: open failures surface as `OpenFailed` and retry policy
    /// belongs to the caller (the dispatcher bounds write-path retries, the
    /// supervisory layer may retry indefinitely).
    pub fn connect(&mut self) -> Result<(), ProtocolError> {
        if self.state.is_open {
            return Ok(());
        }

        let path = self.config.device_path();
        let mut port = open_port(&path, Some(self.config.baud_rate))?;
        configure_port(port.as_mut())?;
        clear_buffers(port.as_mut())?;

        debug!("link open - {}", path);
        self.channel = Some(Box::new(SerialChannel::new(port)));
        self.state = LinkState::WRITABLE;
        self.rx_buffer.clear();
        Ok(())
    }

    /// Close the link
    pub fn disconnect(&mut self) {
        if self.state.is_open {
            debug!("link closed - {}", self.config.device_path());
        }
        self.channel = None;
        self.state = LinkState::CLOSED;
        self.rx_buffer.clear();
    }

    /// Write one frame to the meter.
    ///
    /// If the link is closed this attempts a single connect first; an open
    /// failure propagates so the dispatcher can apply its bounded retry. If
    /// the link is open but busy (a previous request has not resolved), the
    /// write backs off `write_retry_ms` per attempt up to `max_write_attempts`
    /// and then fails with `WriteTimeout`, leaving the link usable.
    pub fn write_frame(&mut self, frame_bytes: &[u8]) -> Result<(), ProtocolError> {
        if !self.state.is_open {
            self.connect()?;
        }

        let mut waited = 0;
        while !self.state.can_write {
            if waited >= self.config.max_write_attempts {
                warn!("write timed out waiting for the link to become writable");
                return Err(ProtocolError::WriteTimeout);
            }
            waited += 1;
            trace!("waiting on writable link (attempt {waited})");
            thread::sleep(Duration::from_millis(self.config.write_retry_ms));
        }

        // Drop anything stale before a fresh exchange
        self.rx_buffer.clear();
        let channel = self.channel.as_mut().ok_or(ProtocolError::NotConnected)?;
        if let Err(e) = channel.clear_input_buffer() {
            warn!("failed to clear input buffer: {e} (continuing)");
        }

        self.state.can_write = false;
        debug!(
            "write - {} bytes: {:02X?}",
            frame_bytes.len(),
            frame_bytes
        );
        if let Err(e) = channel.write_all(frame_bytes) {
            self.disconnect();
            return Err(ProtocolError::Serial(e.to_string()));
        }
        if let Err(e) = channel.flush() {
            self.disconnect();
            return Err(ProtocolError::Serial(e.to_string()));
        }

        Ok(())
    }

    /// Accumulate inbound bytes until a complete frame parses or the deadline
    /// expires.
    ///
    /// Incomplete buffers are retained across quiet periods (more bytes may
    /// still arrive) unless the status bitfield reports overflow or invalid,
    /// which fails the pending request immediately. Every terminal outcome
    /// clears the buffer and restores writability so the next request can
    /// proceed; without that a single lost frame would wedge the link.
    pub fn read_response(&mut self) -> Result<Response, ProtocolError> {
        if self.channel.is_none() {
            return Err(ProtocolError::NotConnected);
        }

        let deadline = Instant::now() + Duration::from_millis(self.config.response_timeout_ms);
        let quiet = Duration::from_millis(self.config.quiet_period_ms);
        let mut last_rx = Instant::now();
        let mut buf = [0u8; 512];

        loop {
            if Instant::now() > deadline {
                debug!(
                    "response deadline reached with {} bytes buffered",
                    self.rx_buffer.len()
                );
                self.finish_request();
                return Err(ProtocolError::Timeout);
            }

            let channel = self.channel.as_mut().ok_or(ProtocolError::NotConnected)?;
            let available = match channel.bytes_to_read() {
                Ok(n) => n,
                Err(e) => {
                    self.disconnect();
                    return Err(ProtocolError::Serial(e.to_string()));
                }
            };

            if available > 0 {
                let to_read = (available as usize).min(buf.len());
                match channel.read(&mut buf[..to_read]) {
                    Ok(0) => {}
                    Ok(n) => {
                        self.rx_buffer.extend_from_slice(&buf[..n]);
                        last_rx = Instant::now();
                        trace!("received {} bytes, total {}", n, self.rx_buffer.len());

                        // Overflow/invalid short-circuit: fail as soon as the
                        // header is in, even with an empty payload, without
                        // waiting for the quiet period.
                        if let Some(status) = frame::peek_status(&self.rx_buffer) {
                            if status.is_overflow() {
                                warn!("meter reported receive overflow");
                                self.finish_request();
                                return Err(ProtocolError::DeviceOverflow);
                            }
                            if status.is_invalid() {
                                warn!("meter flagged the request as invalid");
                                self.finish_request();
                                return Err(ProtocolError::DeviceInvalidCommand);
                            }
                        }
                    }
                    Err(ref e)
                        if e.kind() == std::io::ErrorKind::TimedOut
                            || e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => {
                        self.disconnect();
                        return Err(ProtocolError::Serial(e.to_string()));
                    }
                }
            } else if !self.rx_buffer.is_empty() && last_rx.elapsed() >= quiet {
                // The line has gone idle; see whether the declared length is
                // satisfied.
                match frame::try_parse(&self.rx_buffer) {
                    Ok(ParseOutcome::Complete(response)) => {
                        debug!(
                            "frame complete - status {:#04x}, {} data bytes",
                            response.status.bits(),
                            response.data.len()
                        );
                        self.finish_request();
                        return Ok(response);
                    }
                    Ok(ParseOutcome::Incomplete) => {
                        trace!(
                            "frame incomplete after quiet period ({} bytes), waiting",
                            self.rx_buffer.len()
                        );
                        thread::sleep(Duration::from_millis(POLL_MS));
                    }
                    Err(e) => {
                        self.finish_request();
                        return Err(e);
                    }
                }
            } else {
                thread::sleep(Duration::from_millis(POLL_MS));
            }
        }
    }

    /// Terminal outcome for the in-flight request: drop the buffer and let
    /// the next request through.
    fn finish_request(&mut self) {
        self.rx_buffer.clear();
        self.state.can_write = true;
    }

    /// Bytes currently sitting in the receive accumulator (diagnostics)
    pub fn buffered(&self) -> usize {
        self.rx_buffer.len()
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = LinkConfig::default();
        assert_eq!(config.device, "ttyUSB0");
        assert_eq!(config.baud_rate, 19200);
        assert_eq!(config.max_write_attempts, 10);
    }

    #[test]
    fn test_device_path() {
        let mut config = LinkConfig::default();
        assert_eq!(config.device_path(), "/dev/ttyUSB0");
        config.device = "/dev/serial/by-id/usb-FTDI".to_string();
        assert_eq!(config.device_path(), "/dev/serial/by-id/usb-FTDI");
    }

    #[test]
    fn test_new_link_is_closed() {
        let link = Link::new(LinkConfig::default());
        assert!(!link.is_open());
        assert!(!link.state().can_write);
        assert_eq!(link.buffered(), 0);
    }

    #[test]
    fn test_read_without_channel() {
        let mut link = Link::new(LinkConfig::default());
        assert!(matches!(
            link.read_response(),
            Err(ProtocolError::NotConnected)
        ));
    }
}

//! End-to-end protocol tests against a scripted serial endpoint.

use librelcr_core::prelude::*;
use librelcr_core::protocol::{build_frame, checksum, Channel, Opcode, ProtocolError};
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Scripted serial endpoint: captures outbound frames and plays back timed
/// inbound chunks after each write.
struct MockSerial {
    shared: Arc<Mutex<MockShared>>,
}

struct MockShared {
    written: Vec<Vec<u8>>,
    scripts: VecDeque<Vec<(u64, Vec<u8>)>>,
    current: Vec<(u64, Vec<u8>)>,
    epoch: Instant,
    consumed: usize,
}

impl MockShared {
    /// Bytes the script has released so far for the current request
    fn released(&self) -> Vec<u8> {
        let elapsed = self.epoch.elapsed();
        let mut out = Vec::new();
        for (delay_ms, chunk) in &self.current {
            if Duration::from_millis(*delay_ms) <= elapsed {
                out.extend_from_slice(chunk);
            }
        }
        out
    }
}

impl MockSerial {
    /// One script entry per expected request; each entry is a list of
    /// (delay-after-write in ms, chunk) pairs.
    fn scripted(scripts: Vec<Vec<(u64, Vec<u8>)>>) -> (Self, Arc<Mutex<MockShared>>) {
        let shared = Arc::new(Mutex::new(MockShared {
            written: Vec::new(),
            scripts: scripts.into_iter().collect(),
            current: Vec::new(),
            epoch: Instant::now(),
            consumed: 0,
        }));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            shared,
        )
    }
}

impl Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut shared = self.shared.lock().unwrap();
        let released = shared.released();
        if shared.consumed >= released.len() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let available = &released[shared.consumed..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        shared.consumed += n;
        Ok(n)
    }
}

impl Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut shared = self.shared.lock().unwrap();
        shared.written.push(buf.to_vec());
        shared.current = shared.scripts.pop_front().unwrap_or_default();
        shared.epoch = Instant::now();
        shared.consumed = 0;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Channel for MockSerial {
    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        let mut shared = self.shared.lock().unwrap();
        let released = shared.released().len();
        shared.consumed = released;
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        let shared = self.shared.lock().unwrap();
        Ok((shared.released().len() - shared.consumed) as u32)
    }
}

/// Frame a response the way the meter does (head, addressing, status, data,
/// CRC low/high).
fn response_frame(status: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x7E, 0x7E, 0xFF, 0xFA, status, data.len() as u8];
    frame.extend_from_slice(data);
    let crc = checksum(&frame[2..]);
    frame.push((crc & 0xFF) as u8);
    frame.push((crc >> 8) as u8);
    frame
}

/// Response to a GET_FIELD-style request: return code, device state, value
fn field_response(return_code: u8, device_state: u8, value: &[u8]) -> Vec<u8> {
    let mut data = vec![return_code, device_state];
    data.extend_from_slice(value);
    response_frame(0x80, &data)
}

fn immediate(frame: Vec<u8>) -> Vec<(u64, Vec<u8>)> {
    vec![(0, frame)]
}

fn test_config() -> DeviceConfig {
    let mut config = DeviceConfig::default();
    config.link.quiet_period_ms = 15;
    config.link.response_timeout_ms = 400;
    config.link.write_retry_ms = 5;
    config.link.max_write_attempts = 4;
    config.init_retry_ms = 10;
    config.connect_attempts = Some(2);
    config
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn test_first_request_frame_is_byte_exact() {
    init_tracing();
    let scripts = vec![immediate(field_response(0, 0x05, b"LCR-II"))];
    let (mock, handle) = MockSerial::scripted(scripts);
    let mut device = LcrDevice::with_channel(test_config(), Box::new(mock));

    let product = device.check_status().unwrap();
    assert_eq!(product.product_id, 0x05);
    assert_eq!(product.name, "LCR-II");

    // First frame after connect: node 250, port 255, sync 0x02, GET_PRODUCT_ID
    let written = handle.lock().unwrap().written.clone();
    assert_eq!(
        written[0],
        vec![0x7E, 0x7E, 0xFA, 0xFF, 0x02, 0x01, 0x00, 0x2F, 0x34]
    );
}

#[test]
fn test_chunked_delivery_parses_once() {
    init_tracing();
    let frame = response_frame(0x80, &[0x00, 0x05, 0x41]);
    let scripts = vec![vec![(0, frame[..4].to_vec()), (10, frame[4..].to_vec())]];
    let (mock, _handle) = MockSerial::scripted(scripts);
    let mut link = Link::with_channel(test_config().link, Box::new(mock));

    let request = build_frame(250, 255, 0x02, &[0x00]).unwrap();
    link.write_frame(&request).unwrap();
    let response = link.read_response().unwrap();

    assert_eq!(response.data, vec![0x00, 0x05, 0x41]);
    assert!(response.status.is_valid());
    assert!(link.state().can_write);
    assert_eq!(link.buffered(), 0);
}

#[test]
fn test_overflow_short_circuits_without_quiet_period() {
    init_tracing();
    // Header only, declared length 0, no CRC trailer: a full parse would
    // never complete, so getting DeviceOverflow (not Timeout) proves the
    // status bits short-circuited the wait.
    let scripts = vec![immediate(vec![0x7E, 0x7E, 0xFF, 0xFA, 0x20, 0x00])];
    let (mock, _handle) = MockSerial::scripted(scripts);
    let mut link = Link::with_channel(test_config().link, Box::new(mock));

    let request = build_frame(250, 255, 0x02, &[0x00]).unwrap();
    link.write_frame(&request).unwrap();
    assert!(matches!(
        link.read_response(),
        Err(ProtocolError::DeviceOverflow)
    ));
    assert!(link.state().can_write);
}

#[test]
fn test_invalid_short_circuits_without_quiet_period() {
    init_tracing();
    let scripts = vec![immediate(vec![0x7E, 0x7E, 0xFF, 0xFA, 0x40, 0x00])];
    let (mock, _handle) = MockSerial::scripted(scripts);
    let mut link = Link::with_channel(test_config().link, Box::new(mock));

    let request = build_frame(250, 255, 0x02, &[0x23]).unwrap();
    link.write_frame(&request).unwrap();
    assert!(matches!(
        link.read_response(),
        Err(ProtocolError::DeviceInvalidCommand)
    ));
    assert!(link.state().can_write);
}

#[test]
fn test_checksum_mismatch_fails_request() {
    init_tracing();
    let mut frame = response_frame(0x80, &[0x00, 0x05, 0x41]);
    let last = frame.len() - 1;
    frame[last] ^= 0xFF;
    let scripts = vec![immediate(frame)];
    let (mock, _handle) = MockSerial::scripted(scripts);
    let mut link = Link::with_channel(test_config().link, Box::new(mock));

    let request = build_frame(250, 255, 0x02, &[0x00]).unwrap();
    link.write_frame(&request).unwrap();
    assert!(matches!(
        link.read_response(),
        Err(ProtocolError::ChecksumMismatch { .. })
    ));
    // The link stays usable for the next request
    assert!(link.state().can_write);
    assert_eq!(link.buffered(), 0);
}

#[test]
fn test_response_timeout_restores_writable() {
    init_tracing();
    let mut config = test_config();
    config.link.response_timeout_ms = 60;
    let scripts = vec![vec![]];
    let (mock, _handle) = MockSerial::scripted(scripts);
    let mut link = Link::with_channel(config.link, Box::new(mock));

    let request = build_frame(250, 255, 0x02, &[0x00]).unwrap();
    link.write_frame(&request).unwrap();
    assert!(!link.state().can_write);
    assert!(matches!(link.read_response(), Err(ProtocolError::Timeout)));
    assert!(link.state().can_write);
}

#[test]
fn test_write_while_busy_times_out() {
    init_tracing();
    let scripts = vec![vec![], vec![]];
    let (mock, _handle) = MockSerial::scripted(scripts);
    let mut link = Link::with_channel(test_config().link, Box::new(mock));

    let request = build_frame(250, 255, 0x02, &[0x00]).unwrap();
    link.write_frame(&request).unwrap();
    // The first request never resolved, so the link is still busy
    assert!(matches!(
        link.write_frame(&request),
        Err(ProtocolError::WriteTimeout)
    ));
}

#[test]
fn test_sync_byte_alternates_per_command() {
    init_tracing();
    let scripts = (0..4)
        .map(|_| immediate(field_response(0, 1, &[0x00])))
        .collect();
    let (mock, handle) = MockSerial::scripted(scripts);
    let mut device = LcrDevice::with_channel(test_config(), Box::new(mock));

    for _ in 0..4 {
        device.get_field(0x02).unwrap();
    }

    let written = handle.lock().unwrap().written.clone();
    let sync_bytes: Vec<u8> = written.iter().map(|frame| frame[4]).collect();
    assert_eq!(sync_bytes, vec![0x02, 0x01, 0x00, 0x01]);
}

#[test]
fn test_device_error_resolves_with_reason() {
    init_tracing();
    let scripts = vec![immediate(field_response(33, 0x01, &[]))];
    let (mock, _handle) = MockSerial::scripted(scripts);
    let mut device = LcrDevice::with_channel(test_config(), Box::new(mock));

    let outcome = device.dispatcher().issue_op(Opcode::GetField, &[0x99]).unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.return_code, 33);
    assert_eq!(
        outcome.reason,
        Some("An invalid field number was detected by the LCR device.")
    );
}

#[test]
fn test_device_error_converts_via_require_success() {
    init_tracing();
    let scripts = vec![immediate(field_response(33, 0x01, &[]))];
    let (mock, _handle) = MockSerial::scripted(scripts);
    let mut device = LcrDevice::with_channel(test_config(), Box::new(mock));

    match device.get_field(0x99) {
        Err(ProtocolError::Device { code, detail }) => {
            assert_eq!(code, 33);
            assert_eq!(
                detail,
                "An invalid field number was detected by the LCR device."
            );
        }
        other => panic!("expected a device error, got {other:?}"),
    }
}

#[test]
fn test_volume_field_uses_cached_decimals() {
    init_tracing();
    let scripts = vec![
        // Field 0x27: decimals code 1 -> one decimal place
        immediate(field_response(0, 1, &[0x01])),
        // Field 0x65: raw magnitude 12345
        immediate(field_response(0, 1, &[0x00, 0x00, 0x30, 0x39])),
    ];
    let (mock, handle) = MockSerial::scripted(scripts);
    let mut device = LcrDevice::with_channel(test_config(), Box::new(mock));

    assert_eq!(device.get_decimals().unwrap(), 1);
    let volume = device.get_total_net().unwrap();
    assert_eq!(volume.to_string(), "1234.5");

    let written = handle.lock().unwrap().written.clone();
    assert_eq!(written[0][6..8], [0x20, 0x27]);
    assert_eq!(written[1][6..8], [0x20, 0x65]);
}

#[test]
fn test_set_field_encodes_all_bytes() {
    init_tracing();
    let scripts = vec![immediate(field_response(0, 1, &[]))];
    let (mock, handle) = MockSerial::scripted(scripts);
    let mut device = LcrDevice::with_channel(test_config(), Box::new(mock));

    device.unlock().unwrap();

    let written = handle.lock().unwrap().written.clone();
    // SET_FIELD, field 0x48, five zero code bytes
    assert_eq!(written[0][6..13], [0x21, 0x48, 0, 0, 0, 0, 0]);
}

#[test]
fn test_get_transaction_decodes_record() {
    init_tracing();
    use byteorder::{BigEndian, ByteOrder};
    let mut data = vec![0u8; 41];
    BigEndian::write_i32(&mut data[1..5], 245);
    BigEndian::write_u32(&mut data[5..9], 1001);
    BigEndian::write_u32(&mut data[9..13], 77);
    BigEndian::write_i32(&mut data[13..17], 50123);
    BigEndian::write_i32(&mut data[17..21], 49876);
    BigEndian::write_u16(&mut data[21..23], 0x0004);
    data[23] = 1;
    data[25] = 1;
    data[26] = 3;
    data[27] = 2;
    data[29..41].copy_from_slice(b"060820261430");

    let scripts = vec![immediate(response_frame(0x80, &data))];
    let (mock, _handle) = MockSerial::scripted(scripts);
    let mut device = LcrDevice::with_channel(test_config(), Box::new(mock));

    let record = device.get_transaction().unwrap();
    assert_eq!(record.customer_id, 1001);
    assert_eq!(record.sale_number, 77);
    assert_eq!(record.gross_qty, 50123);
    assert_eq!(record.net_qty, 49876);
    assert_eq!(record.product_id, 3);
    assert_eq!(record.date_time, b"060820261430".to_vec());
}

#[test]
fn test_delivery_status_decodes_flags() {
    init_tracing();
    use librelcr_core::device::flags::delivery_code;
    // return code 0, machine state RUN, status 0x0000, code ACTIVE_DELIVERY
    let data = [0x00, 0x01, 0x00, 0x00, 0x00, 0x08];
    let scripts = vec![immediate(response_frame(0x80, &data))];
    let (mock, _handle) = MockSerial::scripted(scripts);
    let mut device = LcrDevice::with_channel(test_config(), Box::new(mock));

    let snapshot = device.get_delivery_status().unwrap();
    assert_eq!(snapshot.state, Some(MachineState::SwitchRun));
    assert!(snapshot.code.contains(delivery_code::ACTIVE_DELIVERY));
    assert!(snapshot.status.names().is_empty());
}

#[test]
fn test_concurrent_callers_are_serialized() {
    init_tracing();
    let scripts = vec![
        immediate(field_response(0, 1, &[0xAA])),
        immediate(field_response(0, 1, &[0xBB])),
    ];
    let (mock, handle) = MockSerial::scripted(scripts);
    let device = Arc::new(Mutex::new(LcrDevice::with_channel(
        test_config(),
        Box::new(mock),
    )));

    let mut joins = Vec::new();
    for _ in 0..2 {
        let device = Arc::clone(&device);
        joins.push(thread::spawn(move || {
            let mut guard = device.lock().unwrap();
            guard.get_field(0x30).unwrap().value
        }));
    }

    let mut values: Vec<Vec<u8>> = joins.into_iter().map(|j| j.join().unwrap()).collect();
    values.sort();
    // Each caller resolved with exactly one of the scripted responses, in
    // full - no interleaving, no drops
    assert_eq!(values, vec![vec![0xAA], vec![0xBB]]);

    let written = handle.lock().unwrap().written.clone();
    assert_eq!(written.len(), 2);
    assert_ne!(written[0][4], written[1][4]);
}

#[test]
fn test_initialize_runs_ordered_steps() {
    init_tracing();
    use byteorder::{BigEndian, ByteOrder};

    let mut deliveries = [0u8; 4];
    BigEndian::write_u32(&mut deliveries, 7);

    let scripts = vec![
        // identify
        immediate(field_response(0, 0x05, b"LCR-II")),
        // delivery status: RUN, no status flags, ACTIVE_DELIVERY code
        immediate(response_frame(
            0x80,
            &[0x00, 0x01, 0x00, 0x00, 0x00, 0x08],
        )),
        // decimals code 1 -> one decimal place
        immediate(field_response(0, 1, &[0x01])),
        // net totalizer 1111.1
        immediate(field_response(0, 1, &[0x00, 0x00, 0x2B, 0x67])),
        // gross totalizer 2222.2
        immediate(field_response(0, 1, &[0x00, 0x00, 0x56, 0xCE])),
        // shift deliveries
        immediate(field_response(0, 1, &deliveries)),
        // shift net 33.3
        immediate(field_response(0, 1, &[0x00, 0x00, 0x01, 0x4D])),
        // shift gross 44.4
        immediate(field_response(0, 1, &[0x00, 0x00, 0x01, 0xBC])),
        // ticket flag 1 -> no ticket required
        immediate(field_response(0, 1, &[0x01])),
    ];
    let (mock, handle) = MockSerial::scripted(scripts);
    let mut device = LcrDevice::with_channel(test_config(), Box::new(mock));

    let report = device.initialize().unwrap();
    assert_eq!(report.product.name, "LCR-II");
    assert_eq!(report.decimals, 1);
    assert_eq!(report.delivery.state, Some(MachineState::SwitchRun));
    assert_eq!(report.totals.total_net.to_string(), "1111.1");
    assert_eq!(report.totals.total_gross.to_string(), "2222.2");
    assert_eq!(report.totals.shift_net.to_string(), "33.3");
    assert_eq!(report.totals.shift_gross.to_string(), "44.4");
    assert_eq!(report.totals.shift_deliveries, 7);
    assert!(!report.ticket_required);

    // The step order is fixed: identify, delivery status, decimals, net and
    // gross totalizers, shift counters, ticket check
    let written = handle.lock().unwrap().written.clone();
    let opcodes: Vec<u8> = written.iter().map(|frame| frame[6]).collect();
    assert_eq!(
        opcodes,
        vec![0x00, 0x28, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20]
    );
    let fields: Vec<u8> = written[2..].iter().map(|frame| frame[7]).collect();
    assert_eq!(fields, vec![0x27, 0x65, 0x64, 0x0F, 0x0E, 0x0D, 0x25]);
}

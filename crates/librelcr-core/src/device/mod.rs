//! High-level device API
//!
//! The operation surface of an LCR-II register, layered over the request
//! dispatcher: identification, field access, commands, transactions, status
//! blocks and the ordered initialization sequence.

pub mod fields;
pub mod flags;
pub mod transaction;

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::protocol::{
    Channel, Dispatcher, Issued, Link, LinkConfig, MeterCommand, Opcode, ProtocolError,
    DEFAULT_HOST_PORT, DEFAULT_NODE,
};
use fields::{field, FieldValue, Volume};
use flags::{DeliveryCode, DeliveryStatus, MachineState};
use transaction::TransactionRecord;

/// Device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Link configuration (device path, baud, timeouts)
    pub link: LinkConfig,
    /// Network node address of the meter
    pub node: u8,
    /// Port address of the local host
    pub host_port: u8,
    /// Delay between initialization retries in milliseconds
    pub init_retry_ms: u64,
    /// Bounded attempts per initialization step
    pub step_attempts: u32,
    /// Connect attempts before giving up; `None` retries indefinitely, since
    /// the meter may simply be powered on later
    pub connect_attempts: Option<u32>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            node: DEFAULT_NODE,
            host_port: DEFAULT_HOST_PORT,
            init_retry_ms: 2000,
            step_attempts: 10,
            connect_attempts: None,
        }
    }
}

/// Product identification from GET_PRODUCT_ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    /// Active product number
    pub product_id: u8,
    /// Product name as configured on the register
    pub name: String,
}

/// Raw value of a device field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldData {
    /// Device state byte returned alongside the value
    pub device_state: u8,
    /// Field value bytes
    pub value: Vec<u8>,
}

/// Firmware version from GET_VERSION
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Device state byte
    pub device_state: u8,
    /// Version byte
    pub version: u8,
}

/// Security level from GET_SECURITY
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityInfo {
    /// Device state byte
    pub device_state: u8,
    /// Security level bits (see [`flags::security`])
    pub level: u8,
}

/// Machine status block from MACHINE_STATUS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineStatus {
    /// Device state byte
    pub device_state: u8,
    /// Printer state byte
    pub printer_state: u8,
    /// Delivery status word
    pub status: DeliveryStatus,
    /// Delivery code word
    pub code: DeliveryCode,
}

/// Delivery status block from DELIVERY_STATUS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverySnapshot {
    /// Decoded machine state, if the code is documented
    pub state: Option<MachineState>,
    /// Delivery status word
    pub status: DeliveryStatus,
    /// Delivery code word
    pub code: DeliveryCode,
}

/// Totalizer snapshot gathered during initialization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    /// Lifetime gross totalizer
    pub total_gross: Volume,
    /// Lifetime net totalizer
    pub total_net: Volume,
    /// Gross volume this shift
    pub shift_gross: Volume,
    /// Net volume this shift
    pub shift_net: Volume,
    /// Deliveries this shift
    pub shift_deliveries: u32,
}

/// Result of a completed initialization sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitReport {
    /// Product identification
    pub product: ProductInfo,
    /// Delivery status at startup
    pub delivery: DeliverySnapshot,
    /// Volume decimal places in effect
    pub decimals: u8,
    /// Totalizer snapshot
    pub totals: Totals,
    /// True if the register still requires a delivery ticket
    pub ticket_required: bool,
}

/// A single LCR-II register on a serial link.
///
/// All operations take `&mut self`, which makes the single-in-flight request
/// contract a compile-time property. Callers that need to share a device
/// across threads wrap it in a `Mutex`; the lock serializes requests without
/// dropping any.
pub struct LcrDevice {
    dispatcher: Dispatcher,
    config: DeviceConfig,
    decimals: u8,
    product: Option<ProductInfo>,
    version: Option<VersionInfo>,
}

impl LcrDevice {
    /// Create a device over a not-yet-opened serial link
    pub fn new(config: DeviceConfig) -> Self {
        let link = Link::new(config.link.clone());
        let dispatcher = Dispatcher::with_address(link, config.node, config.host_port);
        Self {
            dispatcher,
            config,
            decimals: 1,
            product: None,
            version: None,
        }
    }

    /// Create a device over an already established channel.
    ///
    /// Used by tests and by embeddings that own the transport.
    pub fn with_channel(config: DeviceConfig, channel: Box<dyn Channel>) -> Self {
        let link = Link::with_channel(config.link.clone(), channel);
        let dispatcher = Dispatcher::with_address(link, config.node, config.host_port);
        Self {
            dispatcher,
            config,
            decimals: 1,
            product: None,
            version: None,
        }
    }

    /// Device configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// The underlying dispatcher, for raw request access
    pub fn dispatcher(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Open the link
    pub fn connect(&mut self) -> Result<(), ProtocolError> {
        self.dispatcher.connect()
    }

    /// Close the link
    pub fn disconnect(&mut self) {
        self.dispatcher.disconnect();
    }

    /// True if the serial connection is active
    pub fn is_connected(&self) -> bool {
        self.dispatcher.is_connected()
    }

    /// Volume decimal places currently in effect (default 1 until
    /// [`get_decimals`](Self::get_decimals) has run)
    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Last product identification, if any
    pub fn product(&self) -> Option<&ProductInfo> {
        self.product.as_ref()
    }

    /// Last version reading, if any
    pub fn version(&self) -> Option<VersionInfo> {
        self.version
    }

    /// Identify the meter and its active product (GET_PRODUCT_ID)
    pub fn check_status(&mut self) -> Result<ProductInfo, ProtocolError> {
        let response = self
            .dispatcher
            .issue_op(Opcode::GetProductId, &[])?
            .require_success()?;
        if response.data.len() < 2 {
            return Err(ProtocolError::InvalidResponse);
        }
        let product_id = response.data[1];
        let name = String::from_utf8_lossy(&response.data[2..])
            .trim_matches(char::from(0))
            .trim()
            .to_string();
        info!("meter identified - product {product_id} ({name})");
        let product = ProductInfo { product_id, name };
        self.product = Some(product.clone());
        Ok(product)
    }

    /// Read a numbered field
    pub fn get_field(&mut self, field_num: u8) -> Result<FieldData, ProtocolError> {
        let response = self
            .dispatcher
            .issue_op(Opcode::GetField, &[field_num])?
            .require_success()?;
        if response.data.len() < 2 {
            return Err(ProtocolError::InvalidResponse);
        }
        Ok(FieldData {
            device_state: response.data[1],
            value: response.data[2..].to_vec(),
        })
    }

    /// Write a numbered field; returns the device state byte
    pub fn set_field(&mut self, field_num: u8, value: FieldValue) -> Result<u8, ProtocolError> {
        let mut args = vec![field_num];
        args.extend_from_slice(&value.encode());
        let response = self
            .dispatcher
            .issue_op(Opcode::SetField, &args)?
            .require_success()?;
        debug!("set field {field_num:#04x}");
        Ok(response.data.get(1).copied().unwrap_or(0))
    }

    /// Execute a meter command.
    ///
    /// Returns the raw outcome rather than converting nonzero return codes to
    /// errors: command rejection (wrong switch position, pending ticket, …)
    /// is ordinary operating feedback.
    pub fn command(&mut self, command: MeterCommand) -> Result<Issued, ProtocolError> {
        self.dispatcher
            .issue_op(Opcode::IssueCommand, &[command.byte()])
    }

    /// Start or pause the active delivery (pump-and-print)
    pub fn start_pause_delivery(&mut self) -> Result<Issued, ProtocolError> {
        self.dispatcher.issue_op(Opcode::StartPauseDelivery, &[])
    }

    /// Read the oldest stored transaction
    pub fn get_transaction(&mut self) -> Result<TransactionRecord, ProtocolError> {
        let response = self
            .dispatcher
            .issue_op(Opcode::GetTransaction, &[])?
            .require_success()?;
        TransactionRecord::from_payload(&response.data)
    }

    /// Delete the oldest stored transaction
    pub fn remove_transaction(&mut self) -> Result<(), ProtocolError> {
        self.dispatcher
            .issue_op(Opcode::DeleteTransaction, &[])?
            .require_success()?;
        Ok(())
    }

    /// Check on the request the meter queued while busy
    pub fn check_request(&mut self) -> Result<Issued, ProtocolError> {
        self.dispatcher.issue_op(Opcode::CheckLastRequest, &[])
    }

    /// Abort the queued request
    pub fn abort_request(&mut self) -> Result<Issued, ProtocolError> {
        self.dispatcher.issue_op(Opcode::AbortRequest, &[])
    }

    /// Read the firmware version
    pub fn get_version(&mut self) -> Result<VersionInfo, ProtocolError> {
        let response = self
            .dispatcher
            .issue_op(Opcode::GetVersion, &[])?
            .require_success()?;
        if response.data.len() < 3 {
            return Err(ProtocolError::InvalidResponse);
        }
        let version = VersionInfo {
            device_state: response.data[1],
            version: response.data[2],
        };
        self.version = Some(version);
        Ok(version)
    }

    /// Read the current security level
    pub fn get_security(&mut self) -> Result<SecurityInfo, ProtocolError> {
        let response = self
            .dispatcher
            .issue_op(Opcode::GetSecurity, &[])?
            .require_success()?;
        if response.data.len() < 3 {
            return Err(ProtocolError::InvalidResponse);
        }
        Ok(SecurityInfo {
            device_state: response.data[1],
            level: response.data[2],
        })
    }

    /// Read the machine status block
    pub fn get_machine_status(&mut self) -> Result<MachineStatus, ProtocolError> {
        let response = self
            .dispatcher
            .issue_op(Opcode::MachineStatus, &[])?
            .require_success()?;
        if response.data.len() < 7 {
            return Err(ProtocolError::InvalidResponse);
        }
        Ok(MachineStatus {
            device_state: response.data[1],
            printer_state: response.data[2],
            status: DeliveryStatus::from_wire(BigEndian::read_u16(&response.data[3..5])),
            code: DeliveryCode::from_wire(BigEndian::read_u16(&response.data[5..7])),
        })
    }

    /// Read the delivery status block
    pub fn get_delivery_status(&mut self) -> Result<DeliverySnapshot, ProtocolError> {
        let response = self
            .dispatcher
            .issue_op(Opcode::DeliveryStatus, &[])?
            .require_success()?;
        if response.data.len() < 6 {
            return Err(ProtocolError::InvalidResponse);
        }
        Ok(DeliverySnapshot {
            state: MachineState::from_code(response.data[1]),
            status: DeliveryStatus::from_wire(BigEndian::read_u16(&response.data[2..4])),
            code: DeliveryCode::from_wire(BigEndian::read_u16(&response.data[4..6])),
        })
    }

    /// Read field parameter metadata
    pub fn get_field_params(&mut self, param: u8, block: u8) -> Result<FieldData, ProtocolError> {
        let response = self
            .dispatcher
            .issue_op(Opcode::GetFieldParams, &[param, block])?
            .require_success()?;
        if response.data.len() < 2 {
            return Err(ProtocolError::InvalidResponse);
        }
        Ok(FieldData {
            device_state: response.data[1],
            value: response.data[2..].to_vec(),
        })
    }

    /// Read extended field parameter metadata
    pub fn get_field_params2(&mut self, param: u8, block: u8) -> Result<FieldData, ProtocolError> {
        let response = self
            .dispatcher
            .issue_op(Opcode::GetFieldParams2, &[param, block])?
            .require_success()?;
        if response.data.len() < 2 {
            return Err(ProtocolError::InvalidResponse);
        }
        Ok(FieldData {
            device_state: response.data[1],
            value: response.data[2..].to_vec(),
        })
    }

    /// Change the link baud rate; returns the device state byte
    pub fn set_baud(&mut self, baud_code: u8) -> Result<u8, ProtocolError> {
        let response = self
            .dispatcher
            .issue_op(Opcode::SetBaudRate, &[baud_code])?
            .require_success()?;
        Ok(response.data.get(1).copied().unwrap_or(0))
    }

    /// Read the volume decimal-places setting and cache it for subsequent
    /// volume decoding
    pub fn get_decimals(&mut self) -> Result<u8, ProtocolError> {
        let data = self.get_field(field::VOLUME_DECIMALS)?;
        let code = data
            .value
            .first()
            .copied()
            .ok_or(ProtocolError::InvalidResponse)?;
        self.decimals = fields::decimals_from_code(code);
        Ok(self.decimals)
    }

    /// Read a volume-typed field using the cached decimals setting
    pub fn get_volume_field(&mut self, field_num: u8) -> Result<Volume, ProtocolError> {
        let decimals = self.decimals;
        let data = self.get_field(field_num)?;
        Volume::from_be_bytes(&data.value, decimals)
    }

    /// Read an unsigned-32 field
    pub fn get_u32_field(&mut self, field_num: u8) -> Result<u32, ProtocolError> {
        let data = self.get_field(field_num)?;
        if data.value.len() < 4 {
            return Err(ProtocolError::InvalidResponse);
        }
        Ok(BigEndian::read_u32(&data.value[..4]))
    }

    /// Lifetime gross totalizer
    pub fn get_total_gross(&mut self) -> Result<Volume, ProtocolError> {
        self.get_volume_field(field::GROSS_TOTALIZER)
    }

    /// Lifetime net totalizer
    pub fn get_total_net(&mut self) -> Result<Volume, ProtocolError> {
        self.get_volume_field(field::NET_TOTALIZER)
    }

    /// Gross volume delivered this shift
    pub fn get_shift_gross(&mut self) -> Result<Volume, ProtocolError> {
        self.get_volume_field(field::SHIFT_GROSS)
    }

    /// Net volume delivered this shift
    pub fn get_shift_net(&mut self) -> Result<Volume, ProtocolError> {
        self.get_volume_field(field::SHIFT_NET)
    }

    /// Number of deliveries this shift
    pub fn get_shift_deliveries(&mut self) -> Result<u32, ProtocolError> {
        self.get_u32_field(field::SHIFT_DELIVERIES)
    }

    /// Clear the current shift totals
    pub fn clear_shift(&mut self) -> Result<(), ProtocolError> {
        self.set_field(field::CLEAR_SHIFT, FieldValue::Bytes(vec![0]))?;
        Ok(())
    }

    /// True if the register currently requires a delivery ticket
    pub fn check_printer(&mut self) -> Result<bool, ProtocolError> {
        let data = self.get_field(field::TICKET_REQUIRED)?;
        let flag = data
            .value
            .first()
            .copied()
            .ok_or(ProtocolError::InvalidResponse)?;
        Ok(flag == 0)
    }

    /// Disable the delivery-ticket requirement
    pub fn disable_printer(&mut self) -> Result<u8, ProtocolError> {
        self.set_field(field::TICKET_REQUIRED, FieldValue::Bytes(vec![0x01]))
    }

    /// Operator unlock
    pub fn unlock(&mut self) -> Result<u8, ProtocolError> {
        self.set_field(field::UNLOCK_CODE, FieldValue::Bytes(vec![0; 5]))
    }

    /// Factory unlock
    pub fn unlock_factory(&mut self) -> Result<u8, ProtocolError> {
        self.set_field(field::FACTORY_UNLOCK_CODE, FieldValue::Bytes(vec![0; 5]))
    }

    /// Factory-unlock and switch the register into calibration mode.
    ///
    /// Returns whether the meter accepted the command.
    pub fn enter_calibration(&mut self) -> Result<bool, ProtocolError> {
        self.unlock_factory()?;
        let outcome = self.command(MeterCommand::EnterCalibrateMode)?;
        Ok(outcome.success)
    }

    /// Open the link, retrying with a fixed delay.
    ///
    /// `connect_attempts: None` retries indefinitely - the supervisory policy
    /// for a meter that may be powered on later.
    pub fn connect_supervised(&mut self) -> Result<(), ProtocolError> {
        let delay = Duration::from_millis(self.config.init_retry_ms);
        let mut attempt = 0u32;
        loop {
            match self.dispatcher.connect() {
                Ok(()) => {
                    info!("meter connected");
                    return Ok(());
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    if let Some(max) = self.config.connect_attempts {
                        if attempt >= max {
                            warn!("no meter detected after {attempt} attempts");
                            return Err(e);
                        }
                    }
                    debug!("no meter detected (attempt {attempt}), retrying: {e}");
                    thread::sleep(delay);
                }
            }
        }
    }

    /// Run one named initialization step with uniform bounded retry.
    fn retry_step<T>(
        &mut self,
        name: &'static str,
        mut step: impl FnMut(&mut Self) -> Result<T, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        let attempts = self.config.step_attempts.max(1);
        let delay = Duration::from_millis(self.config.init_retry_ms);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match step(self) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("init: {name} failed (attempt {attempt}): {e}");
                    last_err = Some(e);
                    if attempt < attempts {
                        thread::sleep(delay);
                    }
                }
            }
        }
        Err(last_err.unwrap_or(ProtocolError::NotConnected))
    }

    /// Check the delivery-ticket requirement and try to disable it, bounded.
    ///
    /// Returns whether a ticket is still required afterwards.
    fn ensure_printer_disabled(&mut self) -> Result<bool, ProtocolError> {
        for round in 1..=self.config.step_attempts {
            if !self.check_printer()? {
                return Ok(false);
            }
            info!("meter requires a delivery ticket, disabling (round {round})");
            self.unlock()?;
            if self.enter_calibration()? {
                self.disable_printer()?;
            }
            thread::sleep(Duration::from_millis(50));
        }
        warn!("meter still requires a delivery ticket");
        Ok(true)
    }

    /// Connect to and configure the register.
    ///
    /// An explicit sequence of named steps, each retried uniformly: connect,
    /// identify, delivery status, decimal configuration, totalizers, and the
    /// ticket-printer check.
    pub fn initialize(&mut self) -> Result<InitReport, ProtocolError> {
        info!("begin initialization");
        self.connect_supervised()?;
        let product = self.retry_step("identify", |device| device.check_status())?;
        let delivery = self.retry_step("delivery status", |device| device.get_delivery_status())?;
        let decimals = self.retry_step("volume decimals", |device| device.get_decimals())?;
        let total_net = self.retry_step("net totalizer", |device| device.get_total_net())?;
        let total_gross = self.retry_step("gross totalizer", |device| device.get_total_gross())?;
        let shift_deliveries =
            self.retry_step("shift deliveries", |device| device.get_shift_deliveries())?;
        let shift_net = self.retry_step("shift net", |device| device.get_shift_net())?;
        let shift_gross = self.retry_step("shift gross", |device| device.get_shift_gross())?;
        let ticket_required = self.ensure_printer_disabled()?;

        let totals = Totals {
            total_gross,
            total_net,
            shift_gross,
            shift_net,
            shift_deliveries,
        };
        info!(
            "initialized - total gross {} net {}, shift gross {} net {}, {} deliveries",
            totals.total_gross,
            totals.total_net,
            totals.shift_gross,
            totals.shift_net,
            totals.shift_deliveries
        );
        Ok(InitReport {
            product,
            delivery,
            decimals,
            totals,
            ticket_required,
        })
    }
}

//! Device fields and value encoding
//!
//! Numbered parameters accessed through GET_FIELD/SET_FIELD, the explicit
//! value encoding for field writes, and the fixed-point volume representation
//! the meter uses for totalizer-style fields.

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::protocol::ProtocolError;

/// Well-known field numbers.
pub mod field {
    /// Gross quantity of the current delivery
    pub const GROSS_QTY_CURRENT: u8 = 0x02;
    /// Current flow rate
    pub const FLOW_RATE: u8 = 0x04;
    /// Net preset volume
    pub const NET_PRESET: u8 = 0x06;
    /// Gross volume delivered this shift
    pub const SHIFT_GROSS: u8 = 0x0D;
    /// Net volume delivered this shift
    pub const SHIFT_NET: u8 = 0x0E;
    /// Number of deliveries this shift
    pub const SHIFT_DELIVERIES: u8 = 0x0F;
    /// Write 0 to clear the current shift totals
    pub const CLEAR_SHIFT: u8 = 0x10;
    /// Product-committed gross volume
    pub const PRODUCT_COM_GROSS: u8 = 0x11;
    /// Delivery ticket flag; value 0 means a ticket is required
    pub const TICKET_REQUIRED: u8 = 0x25;
    /// Decimal places used for volume values (device-coded)
    pub const VOLUME_DECIMALS: u8 = 0x27;
    /// Absolute gross quantity of the current delivery
    pub const ABS_GROSS_QTY_CURRENT: u8 = 0x2C;
    /// Operator unlock code
    pub const UNLOCK_CODE: u8 = 0x48;
    /// Factory unlock code
    pub const FACTORY_UNLOCK_CODE: u8 = 0x4A;
    /// Net quantity remaining to the preset
    pub const NET_QTY_REMAINING: u8 = 0x5D;
    /// Lifetime gross totalizer
    pub const GROSS_TOTALIZER: u8 = 0x64;
    /// Lifetime net totalizer
    pub const NET_TOTALIZER: u8 = 0x65;
}

/// Value written to a field, chosen explicitly by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Raw bytes, sent as-is
    Bytes(Vec<u8>),
    /// 32-bit integer, sent big-endian
    Integer(i32),
    /// ASCII text, sent as its bytes
    Text(String),
}

impl FieldValue {
    /// Wire encoding of this value
    pub fn encode(&self) -> Vec<u8> {
        match self {
            FieldValue::Bytes(bytes) => bytes.clone(),
            FieldValue::Integer(value) => {
                let mut buf = [0u8; 4];
                BigEndian::write_i32(&mut buf, *value);
                buf.to_vec()
            }
            FieldValue::Text(text) => text.as_bytes().to_vec(),
        }
    }
}

/// Decode the device's volume-decimals code (field 0x27) into a digit count.
///
/// The register reports 0 for two decimal places, 1 for one, 2 for none;
/// anything else falls back to one.
pub fn decimals_from_code(code: u8) -> u8 {
    match code {
        0 => 2,
        1 => 1,
        2 => 0,
        _ => 1,
    }
}

/// A fixed-point volume value.
///
/// Volume fields carry a 4-byte big-endian signed magnitude; the decimal
/// point position comes from the register's decimals setting, not the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    raw: i32,
    decimals: u8,
}

impl Volume {
    /// Decode a volume from field value bytes (at least four)
    pub fn from_be_bytes(bytes: &[u8], decimals: u8) -> Result<Self, ProtocolError> {
        if bytes.len() < 4 {
            return Err(ProtocolError::InvalidResponse);
        }
        Ok(Self {
            raw: BigEndian::read_i32(&bytes[..4]),
            decimals,
        })
    }

    /// Construct from an already decoded magnitude
    pub fn new(raw: i32, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    /// Raw fixed-point magnitude
    pub fn raw(&self) -> i32 {
        self.raw
    }

    /// Decimal places
    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Value as a float
    pub fn value(&self) -> f64 {
        self.raw as f64 / 10f64.powi(i32::from(self.decimals))
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = (i64::from(self.raw)).unsigned_abs();
        let sign = if self.raw < 0 { "-" } else { "" };
        if self.decimals == 0 {
            return write!(f, "{sign}{magnitude}");
        }
        let digits = format!("{:0>width$}", magnitude, width = self.decimals as usize + 1);
        let split = digits.len() - self.decimals as usize;
        write!(f, "{sign}{}.{}", &digits[..split], &digits[split..])
    }
}

//! Transaction records
//!
//! Decoding of the GET_TRANSACTION payload. The register stores completed
//! deliveries in a queue; each GET_TRANSACTION returns the oldest entry and
//! DELETE_TRANSACTION pops it.

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolError;

/// A completed delivery as stored by the register.
///
/// The 12 date/time bytes are kept raw: their digit layout depends on the
/// register's date-format setting, so rendering is left to the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Customer identifier
    pub customer_id: u32,
    /// Sale number
    pub sale_number: u32,
    /// Product identifier
    pub product_id: u8,
    /// Gross quantity (fixed-point magnitude)
    pub gross_qty: i32,
    /// Net quantity (fixed-point magnitude)
    pub net_qty: i32,
    /// Quantity units code
    pub qty_units: u8,
    /// Decimal places for the quantities
    pub decimals: u8,
    /// Average product temperature (fixed-point magnitude)
    pub product_temp: i32,
    /// Temperature compensation type
    pub temp_compensation: u8,
    /// Temperature scale code
    pub temp_scale: u8,
    /// Raw date/time digits
    pub date_time: Vec<u8>,
    /// Date format code
    pub date_format: u8,
    /// Transaction status word
    pub status: u16,
}

impl TransactionRecord {
    /// Payload length of a full record, return code included
    pub const PAYLOAD_LEN: usize = 41;

    /// Decode a record from a GET_TRANSACTION response payload.
    ///
    /// `data` is the full payload, return code at offset 0; the record fields
    /// follow at the vendor-documented offsets.
    pub fn from_payload(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < Self::PAYLOAD_LEN {
            return Err(ProtocolError::InvalidResponse);
        }

        Ok(Self {
            product_temp: BigEndian::read_i32(&data[1..5]),
            customer_id: BigEndian::read_u32(&data[5..9]),
            sale_number: BigEndian::read_u32(&data[9..13]),
            gross_qty: BigEndian::read_i32(&data[13..17]),
            net_qty: BigEndian::read_i32(&data[17..21]),
            status: BigEndian::read_u16(&data[21..23]),
            temp_compensation: data[23],
            date_format: data[24],
            decimals: data[25],
            product_id: data[26],
            qty_units: data[27],
            temp_scale: data[28],
            date_time: data[29..41].to_vec(),
        })
    }
}

//! # LibreLCR Core Library
//!
//! Core functionality for talking to Liquid Controls LCR-II liquid control
//! registers over a serial line.

#![warn(missing_docs)]

//!
//! This library provides:
//! - The LCP point-to-point wire protocol (framing, CRC-16, sync alternation)
//! - A link manager for the half-duplex serial connection
//! - A request dispatcher with a single-in-flight request contract
//! - A high-level device API (fields, commands, transactions, totalizers)
//!
//! ## Example
//!
//! ```rust,ignore
//! use librelcr_core::device::{DeviceConfig, LcrDevice};
//!
//! let mut meter = LcrDevice::new(DeviceConfig::default());
//! let report = meter.initialize()?;
//! println!("meter: {} (product {})", report.product.name, report.product.product_id);
//!
//! let net = meter.get_total_net()?;
//! println!("net totalizer: {net}");
//! ```

pub mod device;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::device::fields::{field, FieldValue, Volume};
    pub use crate::device::flags::{DeliveryCode, DeliveryStatus, MachineState};
    pub use crate::device::transaction::TransactionRecord;
    pub use crate::device::{DeviceConfig, InitReport, LcrDevice};
    pub use crate::protocol::{
        Dispatcher, Issued, Link, LinkConfig, LinkState, MeterCommand, Opcode, ProtocolError,
        Response,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Status vocabularies
//!
//! Decoded forms of the machine, delivery and security status words the
//! register reports, as documented in the Liquid Controls SDK.

use serde::{Deserialize, Serialize};

/// Switch position / activity reported by MACHINE_STATUS and DELIVERY_STATUS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    /// Control switch between detents
    SwitchBetween,
    /// Control switch at RUN
    SwitchRun,
    /// Control switch at STOP
    SwitchStop,
    /// Control switch at PRINT
    SwitchPrint,
    /// Control switch at SHIFT PRINT
    SwitchShiftPrint,
    /// Control switch at CALIBRATE
    SwitchCalibrate,
    /// State unknown
    Unknown,
    /// Printer busy printing
    PrinterPrinting,
    /// Stop-delivery processing active
    StopDeliveryActive,
    /// End-delivery processing active
    EndDeliveryActive,
    /// Auxiliary state active
    AuxStateActive,
    /// Shift state active
    ShiftStateActive,
    /// Calibrate state active
    CalibrateStateActive,
    /// Waiting for no flow
    WaitingForNoFlow,
    /// Extra state flag
    ExtraStateFlag,
    /// Error flag set
    ErrorFlagSet,
}

impl MachineState {
    /// Decode the status code byte
    pub fn from_code(code: u8) -> Option<Self> {
        let state = match code {
            0x00 => MachineState::SwitchBetween,
            0x01 => MachineState::SwitchRun,
            0x02 => MachineState::SwitchStop,
            0x03 => MachineState::SwitchPrint,
            0x04 => MachineState::SwitchShiftPrint,
            0x05 => MachineState::SwitchCalibrate,
            0x07 => MachineState::Unknown,
            0x08 => MachineState::PrinterPrinting,
            0x10 => MachineState::StopDeliveryActive,
            0x20 => MachineState::EndDeliveryActive,
            0x30 => MachineState::AuxStateActive,
            0x40 => MachineState::ShiftStateActive,
            0x50 => MachineState::CalibrateStateActive,
            0x60 => MachineState::WaitingForNoFlow,
            0x70 => MachineState::ExtraStateFlag,
            0x80 => MachineState::ErrorFlagSet,
            _ => return None,
        };
        Some(state)
    }

    /// Wire code for this state
    pub fn code(self) -> u8 {
        match self {
            MachineState::SwitchBetween => 0x00,
            MachineState::SwitchRun => 0x01,
            MachineState::SwitchStop => 0x02,
            MachineState::SwitchPrint => 0x03,
            MachineState::SwitchShiftPrint => 0x04,
            MachineState::SwitchCalibrate => 0x05,
            MachineState::Unknown => 0x07,
            MachineState::PrinterPrinting => 0x08,
            MachineState::StopDeliveryActive => 0x10,
            MachineState::EndDeliveryActive => 0x20,
            MachineState::AuxStateActive => 0x30,
            MachineState::ShiftStateActive => 0x40,
            MachineState::CalibrateStateActive => 0x50,
            MachineState::WaitingForNoFlow => 0x60,
            MachineState::ExtraStateFlag => 0x70,
            MachineState::ErrorFlagSet => 0x80,
        }
    }
}

/// Delivery status flag bits.
///
/// The vendor list defines flags above bit 15 even though this link revision
/// carries the word in two bytes; the decoded newtype zero-extends, so the
/// high flags simply never match here.
pub mod delivery_status {
    /// Delivery stopped on checksum error
    pub const STOP_ERR_CHKSUM: u32 = 1;
    /// Delivery stopped on temperature error
    pub const STOP_ERR_TEMP: u32 = 1 << 1;
    /// Reset timeout
    pub const RESET_TIMEOUT: u32 = 1 << 2;
    /// Volume comparison error
    pub const ERR_VOLUME_CMP: u32 = 1 << 3;
    /// Unsafe temperature error
    pub const ERR_UNSAFE_TEMP: u32 = 1 << 4;
    /// Calibration error
    pub const ERR_CALIBRATE: u32 = 1 << 5;
    /// Delivery stopped on pulser error
    pub const STOP_ERR_PULSER: u32 = 1 << 6;
    /// Preset reached
    pub const PRESET_REACHED: u32 = 1 << 8;
    /// Delivery stopped on no-flow
    pub const STOP_ERR_NOFLOW: u32 = 1 << 9;
    /// Flow stopped by command
    pub const STOP_FLOW_CMD: u32 = 1 << 10;
    /// Delivery stopped on power failure
    pub const STOP_ERR_POWER: u32 = 1 << 11;
    /// Delivery stopped on preset error
    pub const STOP_ERR_PRESET: u32 = 1 << 12;
    /// Lap pad unhooked
    pub const LAPPAD_UNHOOKED: u32 = 1 << 14;
    /// Delivery ticket required
    pub const TICKET_REQUIRED: u32 = 1 << 15;
    /// Data access error
    pub const ERR_DATA_ACCESS: u32 = 1 << 16;

    pub(super) const NAMES: &[(u32, &str)] = &[
        (STOP_ERR_CHKSUM, "STOP_ERR_CHKSUM"),
        (STOP_ERR_TEMP, "STOP_ERR_TEMP"),
        (RESET_TIMEOUT, "RESET_TIMEOUT"),
        (ERR_VOLUME_CMP, "ERR_VOLUME_CMP"),
        (ERR_UNSAFE_TEMP, "ERR_UNSAFE_TEMP"),
        (ERR_CALIBRATE, "ERR_CALIBRATE"),
        (STOP_ERR_PULSER, "STOP_ERR_PULSER"),
        (PRESET_REACHED, "PRESET_REACHED"),
        (STOP_ERR_NOFLOW, "STOP_ERR_NOFLOW"),
        (STOP_FLOW_CMD, "STOP_FLOW_CMD"),
        (STOP_ERR_POWER, "STOP_ERR_POWER"),
        (STOP_ERR_PRESET, "STOP_ERR_PRESET"),
        (LAPPAD_UNHOOKED, "LAPPAD_UNHOOKED"),
        (TICKET_REQUIRED, "TICKET_REQUIRED"),
        (ERR_DATA_ACCESS, "ERR_DATA_ACCESS"),
    ];
}

/// Delivery code flag bits.
pub mod delivery_code {
    /// A ticket print is pending
    pub const PENDING_PRINT: u32 = 1;
    /// A shift ticket is pending
    pub const SHIFT_TICKET: u32 = 1 << 1;
    /// Product is flowing
    pub const ACTIVE_FLOW: u32 = 1 << 2;
    /// A delivery is active
    pub const ACTIVE_DELIVERY: u32 = 1 << 3;
    /// A gross preset is set
    pub const PRESET_GROSS_SET: u32 = 1 << 4;
    /// A net preset is set
    pub const PRESET_NET_SET: u32 = 1 << 5;
    /// The gross preset was reached
    pub const PRESET_REACHED_GROSS: u32 = 1 << 6;
    /// The net preset was reached
    pub const PRESET_REACHED_NET: u32 = 1 << 8;
    /// Temperature volume control active
    pub const TEMP_VOL_CTL: u32 = 1 << 9;
    /// A preset was reached
    pub const PRESET_REACHED: u32 = 1 << 10;
    /// A delivery is starting
    pub const STARTING_DELIVERY: u32 = 1 << 11;
    /// A new delivery began
    pub const NEW_DELIVERY: u32 = 1 << 12;
    /// Data error notice
    pub const NOTICE_ERR_DATA: u32 = 1 << 14;
    /// Configuration error notice
    pub const NOTICE_ERR_CONFIG: u32 = 1 << 15;
    /// Calibration error notice
    pub const NOTICE_ERR_CALIBRATE: u32 = 1 << 16;
    /// The transaction was saved
    pub const TRANS_SAVED: u32 = 1 << 17;

    pub(super) const NAMES: &[(u32, &str)] = &[
        (PENDING_PRINT, "PENDING_PRINT"),
        (SHIFT_TICKET, "SHIFT_TICKET"),
        (ACTIVE_FLOW, "ACTIVE_FLOW"),
        (ACTIVE_DELIVERY, "ACTIVE_DELIVERY"),
        (PRESET_GROSS_SET, "PRESET_GROSS_SET"),
        (PRESET_NET_SET, "PRESET_NET_SET"),
        (PRESET_REACHED_GROSS, "PRESET_REACHED_GROSS"),
        (PRESET_REACHED_NET, "PRESET_REACHED_NET"),
        (TEMP_VOL_CTL, "TEMP_VOL_CTL"),
        (PRESET_REACHED, "PRESET_REACHED"),
        (STARTING_DELIVERY, "STARTING_DELIVERY"),
        (NEW_DELIVERY, "NEW_DELIVERY"),
        (NOTICE_ERR_DATA, "NOTICE_ERR_DATA"),
        (NOTICE_ERR_CONFIG, "NOTICE_ERR_CONFIG"),
        (NOTICE_ERR_CALIBRATE, "NOTICE_ERR_CALIBRATE"),
        (TRANS_SAVED, "TRANS_SAVED"),
    ];
}

/// Security level flag bits (GET_SECURITY).
pub mod security {
    /// Delivery active but paused
    pub const ACTIVE_PAUSED: u8 = 1;
    /// Fully secured
    pub const FULLY_SECURED: u8 = 1 << 1;
    /// Unlocked, no calibration access
    pub const UNLOCKED_NOCAL: u8 = 1 << 2;
    /// Calibration access without key
    pub const CALIBRATE_NOKEY: u8 = 1 << 3;
    /// Calibration access with key
    pub const CALIBRATE_KEY: u8 = 1 << 4;
    /// Fields always editable
    pub const ALWAYS_EDIT: u8 = 1 << 5;
    /// Fields never editable
    pub const NEVER_EDIT: u8 = 1 << 6;
    /// A delivery is in progress
    pub const ON_DELIVERY: u8 = 1 << 7;
}

/// Decoded delivery status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatus(pub u32);

impl DeliveryStatus {
    /// Decode the two-byte wire field
    pub fn from_wire(raw: u16) -> Self {
        Self(u32::from(raw))
    }

    /// True if any bit of `flag` is set
    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    /// Names of all set flags
    pub fn names(self) -> Vec<&'static str> {
        delivery_status::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

/// Decoded delivery code word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryCode(pub u32);

impl DeliveryCode {
    /// Decode the two-byte wire field
    pub fn from_wire(raw: u16) -> Self {
        Self(u32::from(raw))
    }

    /// True if any bit of `flag` is set
    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    /// Names of all set flags
    pub fn names(self) -> Vec<&'static str> {
        delivery_code::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_state_roundtrip() {
        assert_eq!(MachineState::from_code(0x01), Some(MachineState::SwitchRun));
        assert_eq!(
            MachineState::from_code(0x50),
            Some(MachineState::CalibrateStateActive)
        );
        assert_eq!(MachineState::from_code(0x06), None);
        assert_eq!(MachineState::SwitchStop.code(), 0x02);
    }

    #[test]
    fn test_delivery_status_names() {
        let status = DeliveryStatus::from_wire(
            (delivery_status::PRESET_REACHED | delivery_status::STOP_FLOW_CMD) as u16,
        );
        assert!(status.contains(delivery_status::PRESET_REACHED));
        assert_eq!(status.names(), vec!["PRESET_REACHED", "STOP_FLOW_CMD"]);
    }

    #[test]
    fn test_delivery_code_flags() {
        let code = DeliveryCode::from_wire(delivery_code::ACTIVE_DELIVERY as u16);
        assert!(code.contains(delivery_code::ACTIVE_DELIVERY));
        assert!(!code.contains(delivery_code::PENDING_PRINT));
        assert_eq!(code.names(), vec!["ACTIVE_DELIVERY"]);
    }

    #[test]
    fn test_empty_status() {
        assert!(DeliveryStatus::from_wire(0).names().is_empty());
    }
}

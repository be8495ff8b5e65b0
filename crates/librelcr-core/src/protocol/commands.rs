//! Protocol commands
//!
//! Defines the request opcodes understood by the LCR-II register and the
//! command codes accepted by ISSUE_COMMAND.

use serde::{Deserialize, Serialize};

/// Request opcodes. Sent as the first payload byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opcode {
    /// Identify the meter and its active product
    GetProductId,

    /// Read a numbered device field
    GetField,

    /// Write a numbered device field
    SetField,

    /// Read the machine status block
    MachineStatus,

    /// Execute a meter command (see [`MeterCommand`])
    IssueCommand,

    /// Read the firmware version
    GetVersion,

    /// Read the current security level
    GetSecurity,

    /// Read the delivery status block
    DeliveryStatus,

    /// Start or pause the active delivery (pump-and-print)
    StartPauseDelivery,

    /// Read the oldest stored transaction
    GetTransaction,

    /// Delete the oldest stored transaction
    DeleteTransaction,

    /// Read field parameter metadata
    GetFieldParams,

    /// Change the link baud rate
    SetBaudRate,

    /// Check on the request the meter queued while busy
    CheckLastRequest,

    /// Abort the queued request
    AbortRequest,

    /// Read extended field parameter metadata
    GetFieldParams2,
}

impl Opcode {
    /// Wire byte for this opcode
    pub fn byte(self) -> u8 {
        match self {
            Opcode::GetProductId => 0x00,
            Opcode::GetField => 0x20,
            Opcode::SetField => 0x21,
            Opcode::MachineStatus => 0x23,
            Opcode::IssueCommand => 0x24,
            Opcode::GetVersion => 0x26,
            Opcode::GetSecurity => 0x27,
            Opcode::DeliveryStatus => 0x28,
            Opcode::StartPauseDelivery => 0x29,
            Opcode::GetTransaction => 0x2A,
            Opcode::DeleteTransaction => 0x2B,
            Opcode::GetFieldParams => 0x7B,
            Opcode::SetBaudRate => 0x7C,
            Opcode::CheckLastRequest => 0x7D,
            Opcode::AbortRequest => 0x7E,
            Opcode::GetFieldParams2 => 0x7F,
        }
    }
}

/// Command codes executed through [`Opcode::IssueCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeterCommand {
    /// Start or resume the delivery
    StartResumeDelivery,

    /// Pause the delivery
    PauseDelivery,

    /// End the active delivery
    EndActiveDelivery,

    /// Place the register in auxiliary mode
    EnterAuxMode,

    /// Place the register in shift mode
    EnterShiftMode,

    /// Place the register in calibration mode
    EnterCalibrateMode,

    /// Print a status ticket
    PrintStatusTicket,
}

impl MeterCommand {
    /// Wire byte for this command
    pub fn byte(self) -> u8 {
        match self {
            MeterCommand::StartResumeDelivery => 0,
            MeterCommand::PauseDelivery => 1,
            MeterCommand::EndActiveDelivery => 2,
            MeterCommand::EnterAuxMode => 3,
            MeterCommand::EnterShiftMode => 4,
            MeterCommand::EnterCalibrateMode => 5,
            MeterCommand::PrintStatusTicket => 6,
        }
    }
}

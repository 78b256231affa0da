// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

/// Reject reason codes, RFC 3720 §10.17.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    DataDigestError,
    SnackReject,
    ProtocolError,
    CommandNotSupported,
    ImmediateCommandReject,
    TaskInProgress,
    InvalidDataAck,
    InvalidPduField,
    LongOperationReject,
    NegotiationReset,
    WaitingForLogout,
    Other(u8),
}

impl From<u8> for RejectReason {
    fn from(code: u8) -> Self {
        match code {
            0x02 => Self::DataDigestError,
            0x03 => Self::SnackReject,
            0x04 => Self::ProtocolError,
            0x05 => Self::CommandNotSupported,
            0x06 => Self::ImmediateCommandReject,
            0x07 => Self::TaskInProgress,
            0x08 => Self::InvalidDataAck,
            0x09 => Self::InvalidPduField,
            0x0a => Self::LongOperationReject,
            0x0b => Self::NegotiationReset,
            0x0c => Self::WaitingForLogout,
            other => Self::Other(other),
        }
    }
}

impl From<RejectReason> for u8 {
    fn from(r: RejectReason) -> Self {
        match r {
            RejectReason::DataDigestError => 0x02,
            RejectReason::SnackReject => 0x03,
            RejectReason::ProtocolError => 0x04,
            RejectReason::CommandNotSupported => 0x05,
            RejectReason::ImmediateCommandReject => 0x06,
            RejectReason::TaskInProgress => 0x07,
            RejectReason::InvalidDataAck => 0x08,
            RejectReason::InvalidPduField => 0x09,
            RejectReason::LongOperationReject => 0x0a,
            RejectReason::NegotiationReset => 0x0b,
            RejectReason::WaitingForLogout => 0x0c,
            RejectReason::Other(v) => v,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DataDigestError => "Data (payload) digest error",
            Self::SnackReject => "SNACK reject",
            Self::ProtocolError => "Protocol error",
            Self::CommandNotSupported => "Command not supported",
            Self::ImmediateCommandReject => "Immediate command reject - too many immediate commands",
            Self::TaskInProgress => "Task in progress",
            Self::InvalidDataAck => "Invalid data ack",
            Self::InvalidPduField => "Invalid PDU field",
            Self::LongOperationReject => "Long operation reject - can't generate target transfer tag",
            Self::NegotiationReset => "Negotiation reset",
            Self::WaitingForLogout => "Waiting for logout",
            Self::Other(v) => return write!(f, "Reserved/unknown reason 0x{v:02x}"),
        };
        f.write_str(s)
    }
}

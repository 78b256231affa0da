// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

bitflags::bitflags! {
    #[derive(Default, Clone, Copy, PartialEq, Eq)]
    /// Byte 1 of a SCSI Command PDU.
    pub struct ScsiCommandRequestFlags: u8 {
        const FINAL     = 0x80;
        const READ      = 0x40;
        const WRITE     = 0x20;
        /// lowest 3 bits represent the TaskAttribute
        const ATTR_MASK = 0b0000_0111;
    }
}

impl fmt::Debug for ScsiCommandRequestFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(Self::FINAL) {
            parts.push("FINAL".to_string());
        }
        if self.contains(Self::READ) {
            parts.push("READ".to_string());
        }
        if self.contains(Self::WRITE) {
            parts.push("WRITE".to_string());
        }
        let attr = TaskAttribute::from(self.bits() & Self::ATTR_MASK.bits());
        parts.push(format!("ATTR={attr:?}"));
        write!(f, "ScsiCommandRequestFlags({})", parts.join("|"))
    }
}

/// SCSI task attributes (RFC 3720 §10.3.1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskAttribute {
    Untagged,
    #[default]
    Simple,
    Ordered,
    HeadOfQueue,
    Aca,
    Reserved(u8),
}

impl From<u8> for TaskAttribute {
    fn from(value: u8) -> Self {
        match value & 0x07 {
            0 => TaskAttribute::Untagged,
            1 => TaskAttribute::Simple,
            2 => TaskAttribute::Ordered,
            3 => TaskAttribute::HeadOfQueue,
            4 => TaskAttribute::Aca,
            r => TaskAttribute::Reserved(r),
        }
    }
}

impl From<TaskAttribute> for u8 {
    fn from(value: TaskAttribute) -> Self {
        match value {
            TaskAttribute::Untagged => 0,
            TaskAttribute::Simple => 1,
            TaskAttribute::Ordered => 2,
            TaskAttribute::HeadOfQueue => 3,
            TaskAttribute::Aca => 4,
            TaskAttribute::Reserved(v) => v & ScsiCommandRequestFlags::ATTR_MASK.bits(),
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    /// Byte 1 of a SCSI Response PDU.
    pub struct ScsiCommandResponseFlags: u8 {
        const FINAL   = 0b1000_0000;
        /// Bidirectional read residual overflow (o)
        const O_SMALL = 0b0001_0000;
        /// Bidirectional read residual underflow (u)
        const U_SMALL = 0b0000_1000;
        /// Residual overflow (O)
        const O_BIG   = 0b0000_0100;
        /// Residual underflow (U)
        const U_BIG   = 0b0000_0010;
    }
}

/// SCSI status byte (SAM).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScsiStatus {
    Good,
    CheckCondition,
    Busy,
    ReservationConflict,
    TaskSetFull,
    AcaActive,
    TaskAborted,
    Other(u8),
}

impl From<u8> for ScsiStatus {
    fn from(b: u8) -> Self {
        match b {
            0x00 => ScsiStatus::Good,
            0x02 => ScsiStatus::CheckCondition,
            0x08 => ScsiStatus::Busy,
            0x18 => ScsiStatus::ReservationConflict,
            0x28 => ScsiStatus::TaskSetFull,
            0x30 => ScsiStatus::AcaActive,
            0x40 => ScsiStatus::TaskAborted,
            other => ScsiStatus::Other(other),
        }
    }
}

impl From<ScsiStatus> for u8 {
    fn from(s: ScsiStatus) -> Self {
        match s {
            ScsiStatus::Good => 0x00,
            ScsiStatus::CheckCondition => 0x02,
            ScsiStatus::Busy => 0x08,
            ScsiStatus::ReservationConflict => 0x18,
            ScsiStatus::TaskSetFull => 0x28,
            ScsiStatus::AcaActive => 0x30,
            ScsiStatus::TaskAborted => 0x40,
            ScsiStatus::Other(v) => v,
        }
    }
}

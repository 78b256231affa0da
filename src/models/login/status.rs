// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

/// Login Status-Class, RFC 3720 §10.13.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// target accepted the request
    Success,
    /// initiator must follow TargetAddress
    Redirection,
    /// mistake on initiator side; do not retry
    InitiatorError,
    /// target temporarily cannot fulfil; may retry
    TargetError,
    Unknown(u8),
}

impl From<u8> for StatusClass {
    fn from(b: u8) -> Self {
        match b {
            0 => StatusClass::Success,
            1 => StatusClass::Redirection,
            2 => StatusClass::InitiatorError,
            3 => StatusClass::TargetError,
            other => StatusClass::Unknown(other),
        }
    }
}

impl From<StatusClass> for u8 {
    fn from(class: StatusClass) -> Self {
        match class {
            StatusClass::Success => 0x00,
            StatusClass::Redirection => 0x01,
            StatusClass::InitiatorError => 0x02,
            StatusClass::TargetError => 0x03,
            StatusClass::Unknown(v) => v,
        }
    }
}

/// Class and detail together, with a readable rendering of the well-known
/// combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginStatus {
    pub class: StatusClass,
    pub detail: u8,
}

impl LoginStatus {
    pub fn new(class: u8, detail: u8) -> Self {
        Self {
            class: StatusClass::from(class),
            detail,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.class == StatusClass::Success
    }

    pub fn describe(&self) -> &'static str {
        match (self.class, self.detail) {
            (StatusClass::Success, 0x00) => "success",
            (StatusClass::Redirection, 0x01) => "target moved temporarily",
            (StatusClass::Redirection, 0x02) => "target moved permanently",
            (StatusClass::InitiatorError, 0x00) => "initiator error",
            (StatusClass::InitiatorError, 0x01) => "authentication failure",
            (StatusClass::InitiatorError, 0x02) => "authorization failure",
            (StatusClass::InitiatorError, 0x03) => "target not found",
            (StatusClass::InitiatorError, 0x04) => "target removed",
            (StatusClass::InitiatorError, 0x05) => "unsupported version",
            (StatusClass::InitiatorError, 0x06) => "too many connections",
            (StatusClass::InitiatorError, 0x07) => "missing parameter",
            (StatusClass::InitiatorError, 0x08) => "can't include in session",
            (StatusClass::InitiatorError, 0x09) => "session type not supported",
            (StatusClass::InitiatorError, 0x0a) => "session does not exist",
            (StatusClass::InitiatorError, 0x0b) => "invalid request during login",
            (StatusClass::TargetError, 0x00) => "target error",
            (StatusClass::TargetError, 0x01) => "service unavailable",
            (StatusClass::TargetError, 0x02) => "out of resources",
            _ => "unknown status",
        }
    }
}

impl fmt::Display for LoginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (class 0x{:02x}, detail 0x{:02x})",
            self.describe(),
            u8::from(self.class),
            self.detail
        )
    }
}

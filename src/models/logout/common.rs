// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

/// Logout reason code, low 7 bits of byte 1.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogoutReason {
    /// Close the entire session (all connections)
    #[default]
    CloseSession = 0x00,
    /// Close a specific connection identified by CID
    CloseConnection = 0x01,
    /// Remove a connection for recovery purposes
    RemoveConnectionForRecovery = 0x02,
}

impl TryFrom<u8> for LogoutReason {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> anyhow::Result<Self> {
        Ok(match value & 0x7f {
            0x00 => LogoutReason::CloseSession,
            0x01 => LogoutReason::CloseConnection,
            0x02 => LogoutReason::RemoveConnectionForRecovery,
            other => anyhow::bail!("unexpected logout reason {other}"),
        })
    }
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogoutReason::CloseSession => "CloseSession",
            LogoutReason::CloseConnection => "CloseConnection",
            LogoutReason::RemoveConnectionForRecovery => "RemoveConnectionForRecovery",
        })
    }
}

/// Logout response code, byte 2 of the Logout Response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutResponseCode {
    Success,
    CidNotFound,
    RecoveryNotSupported,
    CleanupFailed,
    Unknown(u8),
}

impl From<u8> for LogoutResponseCode {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Success,
            1 => Self::CidNotFound,
            2 => Self::RecoveryNotSupported,
            3 => Self::CleanupFailed,
            other => Self::Unknown(other),
        }
    }
}

impl From<LogoutResponseCode> for u8 {
    fn from(v: LogoutResponseCode) -> Self {
        match v {
            LogoutResponseCode::Success => 0,
            LogoutResponseCode::CidNotFound => 1,
            LogoutResponseCode::RecoveryNotSupported => 2,
            LogoutResponseCode::CleanupFailed => 3,
            LogoutResponseCode::Unknown(v) => v,
        }
    }
}

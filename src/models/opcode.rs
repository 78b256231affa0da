// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Helpers for encoding / decoding the very first byte of every iSCSI
//! **Basic-Header-Segment** (BHS).
//!
//! ```text
//!  7   6   5   4   3   2   1   0      bit position
//! +---+---+---------------------------+
//! | . | I |        OPCODE (6 bits)    |  ← first BHS octet
//! +---+---+---------------------------+
//! ```
//!
//! * **I** – *Immediate* flag (request PDUs only).
//! * **OPCODE** – 6-bit operation code identifying the PDU type.

use core::fmt;
use std::convert::TryFrom;

use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Mask that selects the lower 6 bits (**OPCODE**) from the first BHS byte.
const OPCODE_MASK: u8 = 0b0011_1111;
/// Mask that selects the **I** bit from the first BHS byte.
const I_MASK: u8 = 0b0100_0000;

/// Op-codes produced or consumed by the initiator (RFC 3720 § 10.2.1.2).
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    #[default]
    NopOut = 0x00,
    ScsiCommandReq = 0x01,
    ScsiTaskMgmtReq = 0x02,
    LoginReq = 0x03,
    TextReq = 0x04,
    ScsiDataOut = 0x05,
    LogoutReq = 0x06,
    /* 0x07–0x1F reserved */
    NopIn = 0x20,
    ScsiCommandResp = 0x21,
    ScsiTaskMgmtResp = 0x22,
    LoginResp = 0x23,
    TextResp = 0x24,
    ScsiDataIn = 0x25,
    LogoutResp = 0x26,
    ReadyToTransfer = 0x31,
    AsyncMessage = 0x32,
    Reject = 0x3F,
}

impl Opcode {
    #[inline]
    pub fn from_u6(v: u8) -> Option<Self> {
        Some(match v {
            0x00 => Self::NopOut,
            0x01 => Self::ScsiCommandReq,
            0x02 => Self::ScsiTaskMgmtReq,
            0x03 => Self::LoginReq,
            0x04 => Self::TextReq,
            0x05 => Self::ScsiDataOut,
            0x06 => Self::LogoutReq,
            0x20 => Self::NopIn,
            0x21 => Self::ScsiCommandResp,
            0x22 => Self::ScsiTaskMgmtResp,
            0x23 => Self::LoginResp,
            0x24 => Self::TextResp,
            0x25 => Self::ScsiDataIn,
            0x26 => Self::LogoutResp,
            0x31 => Self::ReadyToTransfer,
            0x32 => Self::AsyncMessage,
            0x3F => Self::Reject,
            _ => return None,
        })
    }

    /// Reject and Async Message do not carry a usable Initiator Task Tag at
    /// offset 16, so the receive path must not correlate them by tag.
    #[inline]
    pub const fn carries_task_tag(self) -> bool {
        !matches!(self, Self::Reject | Self::AsyncMessage)
    }
}

/// Returned when the lower six bits contain an undefined op-code.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid opcode: 0x{0:02x}")]
pub struct UnknownOpcode(pub u8);

/// Typed representation of the very first BHS byte.
#[derive(Debug, PartialEq, Eq, Default, Clone, Copy)]
pub struct BhsOpcode {
    /// Immediate delivery flag.
    pub immediate: bool,
    pub opcode: Opcode,
}

impl TryFrom<u8> for BhsOpcode {
    type Error = UnknownOpcode;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        let code = byte & OPCODE_MASK;
        let opcode = Opcode::from_u6(code).ok_or(UnknownOpcode(code))?;
        Ok(Self {
            immediate: (byte & I_MASK) != 0,
            opcode,
        })
    }
}

impl From<BhsOpcode> for u8 {
    fn from(b: BhsOpcode) -> u8 {
        let mut raw = b.opcode as u8;
        if b.immediate {
            raw |= I_MASK;
        }
        raw
    }
}

/// Wire-safe, zero-copy first BHS octet.
/// Transparent over `u8`, so it can live inside a zerocopy BHS struct.
#[repr(transparent)]
#[derive(
    Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable,
)]
pub struct RawBhsOpcode(u8);

impl RawBhsOpcode {
    #[inline]
    pub const fn raw(&self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn i(&self) -> bool {
        (self.0 & I_MASK) != 0
    }

    #[inline]
    pub fn set_i(&mut self, on: bool) {
        if on {
            self.0 |= I_MASK;
        } else {
            self.0 &= !I_MASK;
        }
    }

    #[inline]
    pub const fn opcode_raw(&self) -> u8 {
        self.0 & OPCODE_MASK
    }

    #[inline]
    pub fn opcode_known(&self) -> Option<Opcode> {
        Opcode::from_u6(self.opcode_raw())
    }

    #[inline]
    pub fn set_opcode_known(&mut self, k: Opcode) {
        self.0 = (self.0 & !OPCODE_MASK) | ((k as u8) & OPCODE_MASK);
    }
}

impl fmt::Debug for RawBhsOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tmp = f.debug_struct("RawBhsOpcode");
        if self.i() {
            tmp.field("I", &true);
        }
        match self.opcode_known() {
            Some(op) => tmp.field("opcode", &op).finish(),
            None => tmp
                .field("opcode_raw", &format_args!("0x{:02X}", self.opcode_raw()))
                .finish(),
        }
    }
}

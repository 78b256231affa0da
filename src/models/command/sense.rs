// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use anyhow::{Result, bail};

/// Smallest fixed-format sense buffer that still carries ASC/ASCQ.
pub const FIXED_MIN_LEN: usize = 14;

/// Decoded fixed-format sense data (SPC-4 §4.5.3), as carried in the data
/// segment of a SCSI Response behind a 2-byte SenseLength prefix.
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct Sense {
    pub response_code: u8,
    pub sense_key: u8,
    pub asc: u8,
    pub ascq: u8,
}

impl Sense {
    /// Parse the iSCSI sense segment: `SenseLength(2) || SenseData`.
    pub fn from_segment(seg: &[u8]) -> Result<Self> {
        if seg.len() < 2 {
            bail!("sense segment too short: {}", seg.len());
        }
        let sense_len = u16::from_be_bytes([seg[0], seg[1]]) as usize;
        let body = &seg[2..];
        if body.len() < sense_len {
            bail!("sense length {sense_len} exceeds segment ({})", body.len());
        }
        Self::parse(&body[..sense_len])
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < FIXED_MIN_LEN {
            bail!("sense buffer too small: {} < {FIXED_MIN_LEN}", buf.len());
        }
        let response_code = buf[0] & 0x7f;
        if response_code != 0x70 && response_code != 0x71 {
            bail!("not fixed-format sense: 0x{response_code:02x}");
        }
        Ok(Self {
            response_code,
            sense_key: buf[2] & 0x0f,
            asc: buf[12],
            ascq: buf[13],
        })
    }

    pub fn key_name(&self) -> &'static str {
        match self.sense_key {
            0x0 => "NO SENSE",
            0x1 => "RECOVERED ERROR",
            0x2 => "NOT READY",
            0x3 => "MEDIUM ERROR",
            0x4 => "HARDWARE ERROR",
            0x5 => "ILLEGAL REQUEST",
            0x6 => "UNIT ATTENTION",
            0x7 => "DATA PROTECT",
            0xb => "ABORTED COMMAND",
            _ => "OTHER",
        }
    }

    pub fn description(&self) -> &'static str {
        match (self.asc, self.ascq) {
            (0x00, 0x00) => "no additional sense information",
            (0x04, 0x01) => "logical unit is in process of becoming ready",
            (0x11, 0x00) => "unrecovered read error",
            (0x20, 0x00) => "invalid command operation code",
            (0x24, 0x00) => "invalid field in CDB",
            (0x25, 0x00) => "logical unit not supported",
            (0x29, 0x00) => "power on, reset, or bus device reset occurred",
            (0x2a, 0x09) => "capacity data has changed",
            (0x3a, 0x00) => "medium not present",
            (0x3f, 0x0e) => "reported luns data has changed",
            _ => "unspecified / vendor specific",
        }
    }
}

impl fmt::Debug for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sense")
            .field("key", &self.key_name())
            .field("asc", &format_args!("{:#04x}", self.asc))
            .field("ascq", &format_args!("{:#04x}", self.ascq))
            .field("description", &self.description())
            .finish()
    }
}

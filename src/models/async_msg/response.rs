// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U16, U32, U64,
};

use crate::models::{
    common::{NO_TAG, impl_bhs},
    opcode::{Opcode, RawBhsOpcode},
};

/// AsyncEvent codes, RFC 3720 §10.9.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncEvent {
    /// SCSI asynchronous event, sense data in the segment
    ScsiEvent,
    /// target requests logout (Parameter3 = seconds to wait)
    LogoutRequested,
    /// target will drop the connection in Parameter2 seconds
    ConnectionDrop,
    /// target will drop all connections of the session
    SessionDrop,
    /// target requests parameter renegotiation
    Renegotiate,
    VendorSpecific,
    Other(u8),
}

impl From<u8> for AsyncEvent {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::ScsiEvent,
            1 => Self::LogoutRequested,
            2 => Self::ConnectionDrop,
            3 => Self::SessionDrop,
            4 => Self::Renegotiate,
            255 => Self::VendorSpecific,
            other => Self::Other(other),
        }
    }
}

/// BHS for **Asynchronous Message** – RFC 3720 §10.9.
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct AsyncMessage {
    pub opcode: RawBhsOpcode,               // 0
    pub flags: u8,                          // 1 (always 0x80)
    reserved1: [u8; 2],                     // 2..4
    pub total_ahs_length: u8,               // 4
    pub data_segment_length: [u8; 3],       // 5..8
    pub lun: U64<BigEndian>,                // 8..16
    pub initiator_task_tag: U32<BigEndian>, // 16..20 (0xffffffff)
    reserved2: [u8; 4],                     // 20..24
    pub stat_sn: U32<BigEndian>,            // 24..28
    pub exp_cmd_sn: U32<BigEndian>,         // 28..32
    pub max_cmd_sn: U32<BigEndian>,         // 32..36
    pub async_event: u8,                    // 36
    pub async_vcode: u8,                    // 37
    pub parameter1: U16<BigEndian>,         // 38..40
    pub parameter2: U16<BigEndian>,         // 40..42
    pub parameter3: U16<BigEndian>,         // 42..44
    reserved3: [u8; 4],                     // 44..48
}

impl_bhs!(AsyncMessage, Opcode::AsyncMessage);

impl AsyncMessage {
    #[inline]
    pub fn event(&self) -> AsyncEvent {
        AsyncEvent::from(self.async_event)
    }

    pub fn new_header() -> Self {
        let mut h = Self {
            flags: 0x80,
            ..Default::default()
        };
        h.opcode.set_opcode_known(Opcode::AsyncMessage);
        h.initiator_task_tag.set(NO_TAG);
        h
    }
}

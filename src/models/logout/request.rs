// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U16, U32,
};

use crate::models::{
    common::impl_bhs,
    logout::common::LogoutReason,
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for **Logout Request** – RFC 3720 §10.14.
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LogoutRequest {
    pub opcode: RawBhsOpcode,               // 0
    pub reason: u8,                         // 1 (0x80 | reason)
    reserved1: [u8; 2],                     // 2..4
    pub total_ahs_length: u8,               // 4
    pub data_segment_length: [u8; 3],       // 5..8
    reserved2: [u8; 8],                     // 8..16
    pub initiator_task_tag: U32<BigEndian>, // 16..20
    pub cid: U16<BigEndian>,                // 20..22
    reserved3: [u8; 2],                     // 22..24
    pub cmd_sn: U32<BigEndian>,             // 24..28
    pub exp_stat_sn: U32<BigEndian>,        // 28..32
    reserved4: [u8; 16],                    // 32..48
}

impl_bhs!(LogoutRequest, Opcode::LogoutReq);

impl LogoutRequest {
    pub fn reason(&self) -> anyhow::Result<LogoutReason> {
        LogoutReason::try_from(self.reason)
    }
}

/// Builder for a Logout Request header.
#[derive(Debug)]
pub struct LogoutRequestBuilder {
    pub header: LogoutRequest,
}

impl LogoutRequestBuilder {
    pub fn new(reason: LogoutReason) -> Self {
        let mut header = LogoutRequest {
            reason: 0x80 | reason as u8,
            ..Default::default()
        };
        header.opcode.set_opcode_known(Opcode::LogoutReq);
        Self { header }
    }

    pub fn immediate(mut self, on: bool) -> Self {
        self.header.opcode.set_i(on);
        self
    }

    pub fn initiator_task_tag(mut self, tag: u32) -> Self {
        self.header.initiator_task_tag.set(tag);
        self
    }

    pub fn connection_id(mut self, cid: u16) -> Self {
        self.header.cid.set(cid);
        self
    }

    pub fn cmd_sn(mut self, sn: u32) -> Self {
        self.header.cmd_sn.set(sn);
        self
    }

    pub fn exp_stat_sn(mut self, sn: u32) -> Self {
        self.header.exp_stat_sn.set(sn);
        self
    }
}

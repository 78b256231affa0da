// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U16, U32,
};

use crate::models::{
    common::impl_bhs,
    login::common::{RawLoginFlags, Stage},
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for **Login Request** – RFC 3720 §10.12.
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LoginRequest {
    pub opcode: RawBhsOpcode,               // 0 (always immediate)
    pub flags: RawLoginFlags,               // 1
    pub version_max: u8,                    // 2
    pub version_min: u8,                    // 3
    pub total_ahs_length: u8,               // 4
    pub data_segment_length: [u8; 3],       // 5..8
    pub isid: [u8; 6],                      // 8..14
    pub tsih: U16<BigEndian>,               // 14..16
    pub initiator_task_tag: U32<BigEndian>, // 16..20
    pub cid: U16<BigEndian>,                // 20..22
    reserved1: [u8; 2],                     // 22..24
    pub cmd_sn: U32<BigEndian>,             // 24..28
    pub exp_stat_sn: U32<BigEndian>,        // 28..32
    reserved2: [u8; 16],                    // 32..48
}

impl_bhs!(LoginRequest, Opcode::LoginReq);

/// Builder for a Login Request header.
#[derive(Debug)]
pub struct LoginRequestBuilder {
    pub header: LoginRequest,
}

impl Default for LoginRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginRequestBuilder {
    pub fn new() -> Self {
        let mut header = LoginRequest::default();
        header.opcode.set_opcode_known(Opcode::LoginReq);
        header.opcode.set_i(true);
        Self { header }
    }

    pub fn transit(mut self, on: bool) -> Self {
        self.header.flags.set_transit(on);
        self
    }

    pub fn cont(mut self, on: bool) -> Self {
        self.header.flags.set_cont(on);
        self
    }

    pub fn csg(mut self, stage: Stage) -> Self {
        self.header.flags.set_csg(stage);
        self
    }

    pub fn nsg(mut self, stage: Stage) -> Self {
        self.header.flags.set_nsg(stage);
        self
    }

    pub fn versions(mut self, max: u8, min: u8) -> Self {
        self.header.version_max = max;
        self.header.version_min = min;
        self
    }

    pub fn isid(mut self, isid: &[u8; 6]) -> Self {
        self.header.isid.copy_from_slice(isid);
        self
    }

    pub fn tsih(mut self, tsih: u16) -> Self {
        self.header.tsih.set(tsih);
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

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U16, U32,
};

use crate::models::{
    common::impl_bhs,
    login::{common::RawLoginFlags, status::LoginStatus},
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for **Login Response** – RFC 3720 §10.13.
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct LoginResponse {
    pub opcode: RawBhsOpcode,               // 0
    pub flags: RawLoginFlags,               // 1
    pub version_max: u8,                    // 2
    pub version_active: u8,                 // 3
    pub total_ahs_length: u8,               // 4
    pub data_segment_length: [u8; 3],       // 5..8
    pub isid: [u8; 6],                      // 8..14
    pub tsih: U16<BigEndian>,               // 14..16
    pub initiator_task_tag: U32<BigEndian>, // 16..20
    reserved1: [u8; 4],                     // 20..24
    pub stat_sn: U32<BigEndian>,            // 24..28
    pub exp_cmd_sn: U32<BigEndian>,         // 28..32
    pub max_cmd_sn: U32<BigEndian>,         // 32..36
    pub status_class: u8,                   // 36
    pub status_detail: u8,                  // 37
    reserved2: [u8; 10],                    // 38..48
}

impl_bhs!(LoginResponse, Opcode::LoginResp);

impl LoginResponse {
    #[inline]
    pub fn status(&self) -> LoginStatus {
        LoginStatus::new(self.status_class, self.status_detail)
    }

    pub fn new_header() -> Self {
        let mut h = Self::default();
        h.opcode.set_opcode_known(Opcode::LoginResp);
        h
    }
}

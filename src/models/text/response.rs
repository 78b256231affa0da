// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U32, U64,
};

use crate::models::{
    common::{NO_TAG, impl_bhs},
    opcode::{Opcode, RawBhsOpcode},
    text::common::RawStageFlags,
};

/// BHS for **Text Response** – RFC 3720 §10.11.
#[repr(C)]
#[derive(Default, Debug, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct TextResponse {
    pub opcode: RawBhsOpcode,                // 0
    pub flags: RawStageFlags,                // 1
    reserved1: [u8; 2],                      // 2..4
    pub total_ahs_length: u8,                // 4
    pub data_segment_length: [u8; 3],        // 5..8
    pub lun: U64<BigEndian>,                 // 8..16
    pub initiator_task_tag: U32<BigEndian>,  // 16..20
    pub target_transfer_tag: U32<BigEndian>, // 20..24
    pub stat_sn: U32<BigEndian>,             // 24..28
    pub exp_cmd_sn: U32<BigEndian>,          // 28..32
    pub max_cmd_sn: U32<BigEndian>,          // 32..36
    reserved2: [u8; 12],                     // 36..48
}

impl_bhs!(TextResponse, Opcode::TextResp);

impl TextResponse {
    pub fn new_header() -> Self {
        let mut h = Self::default();
        h.opcode.set_opcode_known(Opcode::TextResp);
        h.target_transfer_tag.set(NO_TAG);
        h
    }
}

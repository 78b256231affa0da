// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U32, U64,
};

use crate::models::{
    common::{NO_TAG, impl_bhs},
    data::common::RawDataInFlags,
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for **SCSI Data-In** – RFC 3720 §10.7.
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ScsiDataIn {
    pub opcode: RawBhsOpcode,                // 0
    pub flags: RawDataInFlags,               // 1
    reserved1: u8,                           // 2
    pub status_or_rsvd: u8,                  // 3 (SCSI status when S=1)
    pub total_ahs_length: u8,                // 4
    pub data_segment_length: [u8; 3],        // 5..8
    pub lun: U64<BigEndian>,                 // 8..16
    pub initiator_task_tag: U32<BigEndian>,  // 16..20
    pub target_transfer_tag: U32<BigEndian>, // 20..24
    pub stat_sn_or_rsvd: U32<BigEndian>,     // 24..28 (StatSN when S=1)
    pub exp_cmd_sn: U32<BigEndian>,          // 28..32
    pub max_cmd_sn: U32<BigEndian>,          // 32..36
    pub data_sn: U32<BigEndian>,             // 36..40
    pub buffer_offset: U32<BigEndian>,       // 40..44
    pub residual_count: U32<BigEndian>,      // 44..48
}

impl_bhs!(ScsiDataIn, Opcode::ScsiDataIn);

impl ScsiDataIn {
    pub fn new_header() -> Self {
        let mut h = Self::default();
        h.opcode.set_opcode_known(Opcode::ScsiDataIn);
        h.target_transfer_tag.set(NO_TAG);
        h
    }
}

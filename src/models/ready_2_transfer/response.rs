// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U32, U64,
};

use crate::models::{
    common::impl_bhs,
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for **Ready To Transfer** – RFC 3720 §10.8.
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ReadyToTransfer {
    pub opcode: RawBhsOpcode,                       // 0
    pub flags: u8,                                  // 1 (always 0x80)
    reserved1: [u8; 2],                             // 2..4
    pub total_ahs_length: u8,                       // 4
    pub data_segment_length: [u8; 3],               // 5..8
    pub lun: U64<BigEndian>,                        // 8..16
    pub initiator_task_tag: U32<BigEndian>,         // 16..20
    pub target_transfer_tag: U32<BigEndian>,        // 20..24
    pub stat_sn: U32<BigEndian>,                    // 24..28
    pub exp_cmd_sn: U32<BigEndian>,                 // 28..32
    pub max_cmd_sn: U32<BigEndian>,                 // 32..36
    pub r2t_sn: U32<BigEndian>,                     // 36..40
    pub buffer_offset: U32<BigEndian>,              // 40..44
    pub desired_data_transfer_length: U32<BigEndian>, // 44..48
}

impl_bhs!(ReadyToTransfer, Opcode::ReadyToTransfer);

impl ReadyToTransfer {
    pub fn new_header() -> Self {
        let mut h = Self {
            flags: 0x80,
            ..Default::default()
        };
        h.opcode.set_opcode_known(Opcode::ReadyToTransfer);
        h
    }
}

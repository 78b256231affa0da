// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U32};

use crate::models::{
    command::common::{ScsiCommandResponseFlags, ScsiStatus},
    common::impl_bhs,
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for **SCSI Response** – RFC 3720 §10.4.
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ScsiCommandResponse {
    pub opcode: RawBhsOpcode,                           // 0
    pub flags: u8,                                      // 1
    pub response: u8,                                   // 2
    pub status: u8,                                     // 3
    pub total_ahs_length: u8,                           // 4
    pub data_segment_length: [u8; 3],                   // 5..8
    reserved1: [u8; 8],                                 // 8..16
    pub initiator_task_tag: U32<BigEndian>,             // 16..20
    pub snack_tag: U32<BigEndian>,                      // 20..24
    pub stat_sn: U32<BigEndian>,                        // 24..28
    pub exp_cmd_sn: U32<BigEndian>,                     // 28..32
    pub max_cmd_sn: U32<BigEndian>,                     // 32..36
    pub exp_data_sn: U32<BigEndian>,                    // 36..40
    pub bidirectional_read_residual_count: U32<BigEndian>, // 40..44
    pub residual_count: U32<BigEndian>,                 // 44..48
}

impl_bhs!(ScsiCommandResponse, Opcode::ScsiCommandResp);

impl ScsiCommandResponse {
    #[inline]
    pub fn flags(&self) -> ScsiCommandResponseFlags {
        ScsiCommandResponseFlags::from_bits_retain(self.flags)
    }

    #[inline]
    pub fn scsi_status(&self) -> ScsiStatus {
        ScsiStatus::from(self.status)
    }

    pub fn new_header() -> Self {
        let mut h = Self {
            flags: ScsiCommandResponseFlags::FINAL.bits(),
            ..Default::default()
        };
        h.opcode.set_opcode_known(Opcode::ScsiCommandResp);
        h
    }
}

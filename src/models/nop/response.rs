// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U32, U64,
};

use crate::models::{
    common::{NO_TAG, impl_bhs},
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for **NOP-In** – RFC 3720 §10.19.
///
/// A target ping carries `initiator_task_tag == NO_TAG` and a real
/// `target_transfer_tag`; a reply to our NOP-Out echoes our tag and sets
/// `target_transfer_tag == NO_TAG`.
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct NopInResponse {
    pub opcode: RawBhsOpcode,                // 0
    pub flags: u8,                           // 1
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

impl_bhs!(NopInResponse, Opcode::NopIn);

impl NopInResponse {
    /// Whether the target asks us to answer with a NOP-Out.
    #[inline]
    pub fn wants_reply(&self) -> bool {
        self.target_transfer_tag.get() != NO_TAG
    }

    /// Header with the fixed fields a target would emit; used by tests and
    /// mock targets.
    pub fn new_header() -> Self {
        let mut h = Self {
            flags: 0x80,
            ..Default::default()
        };
        h.opcode.set_opcode_known(Opcode::NopIn);
        h.initiator_task_tag.set(NO_TAG);
        h.target_transfer_tag.set(NO_TAG);
        h
    }
}

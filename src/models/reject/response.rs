// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U32};

use crate::models::{
    common::{NO_TAG, impl_bhs},
    opcode::{Opcode, RawBhsOpcode},
    reject::reject_description::RejectReason,
};

/// BHS for **Reject** – RFC 3720 §10.17.
///
/// The data segment carries the complete 48-byte header of the rejected PDU.
/// Bytes 16..20 are reserved here and always read as `0xffffffff`.
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RejectPdu {
    pub opcode: RawBhsOpcode,               // 0
    pub flags: u8,                          // 1 (always 0x80)
    pub reason: u8,                         // 2
    reserved1: u8,                          // 3
    pub total_ahs_length: u8,               // 4
    pub data_segment_length: [u8; 3],       // 5..8
    reserved2: [u8; 8],                     // 8..16
    pub initiator_task_tag: U32<BigEndian>, // 16..20 (0xffffffff)
    reserved3: [u8; 4],                     // 20..24
    pub stat_sn: U32<BigEndian>,            // 24..28
    pub exp_cmd_sn: U32<BigEndian>,         // 28..32
    pub max_cmd_sn: U32<BigEndian>,         // 32..36
    pub data_sn_or_r2t_sn: U32<BigEndian>,  // 36..40
    reserved4: [u8; 8],                     // 40..48
}

impl_bhs!(RejectPdu, Opcode::Reject);

impl RejectPdu {
    #[inline]
    pub fn reason(&self) -> RejectReason {
        RejectReason::from(self.reason)
    }

    pub fn new_header() -> Self {
        let mut h = Self {
            flags: 0x80,
            ..Default::default()
        };
        h.opcode.set_opcode_known(Opcode::Reject);
        h.initiator_task_tag.set(NO_TAG);
        h
    }
}

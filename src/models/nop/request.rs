// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U32, U64,
};

use crate::models::{
    common::{NO_TAG, impl_bhs},
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for **NOP-Out** – RFC 3720 §10.18.
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct NopOutRequest {
    pub opcode: RawBhsOpcode,                // 0
    pub flags: u8,                           // 1 (always 0x80)
    reserved1: [u8; 2],                      // 2..4
    pub total_ahs_length: u8,                // 4
    pub data_segment_length: [u8; 3],        // 5..8
    pub lun: U64<BigEndian>,                 // 8..16
    pub initiator_task_tag: U32<BigEndian>,  // 16..20
    pub target_transfer_tag: U32<BigEndian>, // 20..24
    pub cmd_sn: U32<BigEndian>,              // 24..28
    pub exp_stat_sn: U32<BigEndian>,         // 28..32
    reserved2: [u8; 16],                     // 32..48
}

impl_bhs!(NopOutRequest, Opcode::NopOut);

/// Builder for a NOP-Out header.
#[derive(Debug)]
pub struct NopOutRequestBuilder {
    pub header: NopOutRequest,
}

impl Default for NopOutRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NopOutRequestBuilder {
    pub fn new() -> Self {
        let mut header = NopOutRequest {
            flags: 0x80,
            ..Default::default()
        };
        header.opcode.set_opcode_known(Opcode::NopOut);
        header.target_transfer_tag.set(NO_TAG);
        Self { header }
    }

    pub fn immediate(mut self) -> Self {
        self.header.opcode.set_i(true);
        self
    }

    pub fn lun(mut self, lun: u64) -> Self {
        self.header.lun.set(lun);
        self
    }

    pub fn initiator_task_tag(mut self, tag: u32) -> Self {
        self.header.initiator_task_tag.set(tag);
        self
    }

    pub fn target_transfer_tag(mut self, tag: u32) -> Self {
        self.header.target_transfer_tag.set(tag);
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

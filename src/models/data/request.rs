// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U32, U64,
};

use crate::models::{
    common::{NO_TAG, impl_bhs},
    data::common::RawDataOutFlags,
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for **SCSI Data-Out** – RFC 3720 §10.7.
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ScsiDataOut {
    pub opcode: RawBhsOpcode,                // 0
    pub flags: RawDataOutFlags,              // 1
    reserved1: [u8; 2],                      // 2..4
    pub total_ahs_length: u8,                // 4
    pub data_segment_length: [u8; 3],        // 5..8
    pub lun: U64<BigEndian>,                 // 8..16
    pub initiator_task_tag: U32<BigEndian>,  // 16..20
    pub target_transfer_tag: U32<BigEndian>, // 20..24
    reserved2: [u8; 4],                      // 24..28
    pub exp_stat_sn: U32<BigEndian>,         // 28..32
    reserved3: [u8; 4],                      // 32..36
    pub data_sn: U32<BigEndian>,             // 36..40
    pub buffer_offset: U32<BigEndian>,       // 40..44
    reserved4: [u8; 4],                      // 44..48
}

impl_bhs!(ScsiDataOut, Opcode::ScsiDataOut);

/// Builder for a Data-Out header.
#[derive(Debug)]
pub struct ScsiDataOutBuilder {
    pub header: ScsiDataOut,
}

impl Default for ScsiDataOutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScsiDataOutBuilder {
    pub fn new() -> Self {
        let mut header = ScsiDataOut::default();
        header.opcode.set_opcode_known(Opcode::ScsiDataOut);
        header.target_transfer_tag.set(NO_TAG);
        Self { header }
    }

    pub fn final_bit(mut self, on: bool) -> Self {
        self.header.flags.set_fin(on);
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

    pub fn exp_stat_sn(mut self, sn: u32) -> Self {
        self.header.exp_stat_sn.set(sn);
        self
    }

    pub fn data_sn(mut self, sn: u32) -> Self {
        self.header.data_sn.set(sn);
        self
    }

    pub fn buffer_offset(mut self, offset: u32) -> Self {
        self.header.buffer_offset.set(offset);
        self
    }

    pub fn data_segment_length(mut self, len: u32) -> Self {
        crate::models::common::u24_set(&mut self.header.data_segment_length, len);
        self
    }
}

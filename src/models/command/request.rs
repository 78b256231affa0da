// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{
    BigEndian, FromBytes as ZFromBytes, Immutable, IntoBytes, KnownLayout, U32, U64,
};

use crate::models::{
    command::common::{ScsiCommandRequestFlags, TaskAttribute},
    common::impl_bhs,
    opcode::{Opcode, RawBhsOpcode},
};

/// BHS for **SCSI Command** – RFC 3720 §10.3.
#[repr(C)]
#[derive(Debug, Default, PartialEq, ZFromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ScsiCommandRequest {
    pub opcode: RawBhsOpcode,                           // 0
    pub flags: u8,                                      // 1
    reserved1: [u8; 2],                                 // 2..4
    pub total_ahs_length: u8,                           // 4
    pub data_segment_length: [u8; 3],                   // 5..8
    pub lun: U64<BigEndian>,                            // 8..16
    pub initiator_task_tag: U32<BigEndian>,             // 16..20
    pub expected_data_transfer_length: U32<BigEndian>,  // 20..24
    pub cmd_sn: U32<BigEndian>,                         // 24..28
    pub exp_stat_sn: U32<BigEndian>,                    // 28..32
    pub scsi_descriptor_block: [u8; 16],                // 32..48
}

impl_bhs!(ScsiCommandRequest, Opcode::ScsiCommandReq);

impl ScsiCommandRequest {
    #[inline]
    pub fn flags(&self) -> ScsiCommandRequestFlags {
        ScsiCommandRequestFlags::from_bits_retain(self.flags)
    }
}

/// Builder for a SCSI Command header.
#[derive(Debug)]
pub struct ScsiCommandRequestBuilder {
    pub header: ScsiCommandRequest,
}

impl Default for ScsiCommandRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScsiCommandRequestBuilder {
    pub fn new() -> Self {
        let mut header = ScsiCommandRequest::default();
        header.opcode.set_opcode_known(Opcode::ScsiCommandReq);
        Self { header }
    }

    fn set_flag(mut self, flag: ScsiCommandRequestFlags, on: bool) -> Self {
        let mut f = self.header.flags();
        f.set(flag, on);
        self.header.flags = f.bits();
        self
    }

    pub fn immediate(mut self, on: bool) -> Self {
        self.header.opcode.set_i(on);
        self
    }

    pub fn final_bit(self, on: bool) -> Self {
        self.set_flag(ScsiCommandRequestFlags::FINAL, on)
    }

    pub fn read(self, on: bool) -> Self {
        self.set_flag(ScsiCommandRequestFlags::READ, on)
    }

    pub fn write(self, on: bool) -> Self {
        self.set_flag(ScsiCommandRequestFlags::WRITE, on)
    }

    pub fn task_attribute(mut self, task: TaskAttribute) -> Self {
        let attr = ScsiCommandRequestFlags::ATTR_MASK.bits();
        self.header.flags = (self.header.flags & !attr) | (u8::from(task) & attr);
        self
    }

    pub fn initiator_task_tag(mut self, tag: u32) -> Self {
        self.header.initiator_task_tag.set(tag);
        self
    }

    pub fn expected_data_transfer_length(mut self, len: u32) -> Self {
        self.header.expected_data_transfer_length.set(len);
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

    pub fn lun(mut self, lun: u64) -> Self {
        self.header.lun.set(lun);
        self
    }

    pub fn scsi_descriptor_block(mut self, cdb: &[u8; 16]) -> Self {
        self.header.scsi_descriptor_block = *cdb;
        self
    }
}

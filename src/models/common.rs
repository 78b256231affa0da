// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use enum_dispatch::enum_dispatch;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::models::opcode::BhsOpcode;

/// Length of every Basic Header Segment on the wire.
pub const HEADER_LEN: usize = 48;

/// Reserved tag value meaning "no task" / "no reply wanted".
pub const NO_TAG: u32 = 0xffff_ffff;

/// Well-known iSCSI TCP port.
pub const ISCSI_PORT: u16 = 3260;

/// Padding needed to bring `n` up to the next 4-byte boundary.
#[inline]
pub fn pad_len(n: usize) -> usize {
    (4 - (n % 4)) % 4
}

/// Common functionality for any iSCSI PDU "Basic Header Segment" (BHS).
///
/// Every header type in [`crate::models`] is a `#[repr(C)]` zero-copy view
/// over exactly [`HEADER_LEN`] bytes; this trait exposes the fields that sit
/// at the same place for every opcode.
#[enum_dispatch]
pub trait BasicHeaderSegment {
    /// Serialize this header into a [`HEADER_LEN`]-byte buffer.
    fn to_bhs_bytes(&self, buf: &mut [u8]) -> Result<()>;

    /// First octet of the BHS, decoded.
    fn get_opcode(&self) -> Result<BhsOpcode>;

    /// Initiator Task Tag (bytes 16..20).
    fn get_initiator_task_tag(&self) -> u32;

    /// Number of AHS bytes that follow the BHS.
    fn get_ahs_length_bytes(&self) -> usize;

    /// Set TotalAHSLength, given in bytes.
    fn set_ahs_length_bytes(&mut self, len: u8);

    /// DataSegmentLength without padding.
    fn get_data_length_bytes(&self) -> usize;

    /// Set DataSegmentLength (24-bit).
    fn set_data_length_bytes(&mut self, len: u32);
}

/// Marker for headers that may be viewed in place over a raw BHS buffer.
pub trait ZeroCopyType: KnownLayout + Immutable + IntoBytes + FromBytes {}

#[inline]
pub(crate) fn u24_get(b: &[u8; 3]) -> usize {
    u32::from_be_bytes([0, b[0], b[1], b[2]]) as usize
}

#[inline]
pub(crate) fn u24_set(b: &mut [u8; 3], len: u32) {
    let be = len.to_be_bytes();
    *b = [be[1], be[2], be[3]];
}

/// Implements [`BasicHeaderSegment`], [`ZeroCopyType`] and the
/// `to_bhs_bytes` / `from_bhs_bytes` pair for a zerocopy header whose
/// layout starts with `opcode`, has `total_ahs_length` at byte 4,
/// `data_segment_length` at 5..8 and `initiator_task_tag` at 16..20.
macro_rules! impl_bhs {
    ($ty:ty, $op:expr) => {
        impl $ty {
            pub fn to_bhs_bytes(&self, buf: &mut [u8]) -> ::anyhow::Result<()> {
                if buf.len() != $crate::models::common::HEADER_LEN {
                    ::anyhow::bail!(
                        "buffer length must be {}, got {}",
                        $crate::models::common::HEADER_LEN,
                        buf.len()
                    );
                }
                buf.copy_from_slice(::zerocopy::IntoBytes::as_bytes(self));
                Ok(())
            }

            pub fn from_bhs_bytes(buf: &mut [u8]) -> ::anyhow::Result<&mut Self> {
                let hdr = <Self as ::zerocopy::FromBytes>::mut_from_bytes(buf).map_err(
                    |e| {
                        ::anyhow::anyhow!(
                            "failed convert buffer {}: {e}",
                            stringify!($ty)
                        )
                    },
                )?;
                if hdr.opcode.opcode_known() != Some($op) {
                    ::anyhow::bail!(
                        "{}: invalid opcode 0x{:02x}",
                        stringify!($ty),
                        hdr.opcode.opcode_raw()
                    );
                }
                Ok(hdr)
            }
        }

        impl $crate::models::common::BasicHeaderSegment for $ty {
            #[inline]
            fn to_bhs_bytes(&self, buf: &mut [u8]) -> ::anyhow::Result<()> {
                <$ty>::to_bhs_bytes(self, buf)
            }

            #[inline]
            fn get_opcode(
                &self,
            ) -> ::anyhow::Result<$crate::models::opcode::BhsOpcode> {
                Ok($crate::models::opcode::BhsOpcode::try_from(self.opcode.raw())?)
            }

            #[inline]
            fn get_initiator_task_tag(&self) -> u32 {
                self.initiator_task_tag.get()
            }

            #[inline]
            fn get_ahs_length_bytes(&self) -> usize {
                (self.total_ahs_length as usize) * 4
            }

            #[inline]
            fn set_ahs_length_bytes(&mut self, len: u8) {
                self.total_ahs_length = len >> 2;
            }

            #[inline]
            fn get_data_length_bytes(&self) -> usize {
                $crate::models::common::u24_get(&self.data_segment_length)
            }

            #[inline]
            fn set_data_length_bytes(&mut self, len: u32) {
                $crate::models::common::u24_set(&mut self.data_segment_length, len)
            }
        }

        impl $crate::models::common::ZeroCopyType for $ty {}
    };
}

pub(crate) use impl_bhs;

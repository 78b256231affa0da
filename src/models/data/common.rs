// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

bitflags::bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    /// Flags for SCSI Data-Out.
    pub struct DataOutFlags: u8 {
        /// Last Data-Out PDU of the current sequence.
        const FINAL = 0b1000_0000;
    }
}

bitflags::bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    /// Flags for SCSI Data-In.
    pub struct DataInFlags: u8 {
        /// Last Data-In PDU of the current sequence.
        const FINAL = 1 << 7;
        /// DataACK SNACK requested (ERL > 0 only)
        const A = 1 << 6;
        /// Residual overflow, valid with S
        const O = 1 << 2;
        /// Residual underflow, valid with S
        const U = 1 << 1;
        /// Status present; implies FINAL
        const S = 1 << 0;
    }
}

/// Wire view for Data-In flags (byte 1 of the PDU).
#[repr(transparent)]
#[derive(
    Default, Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable,
)]
pub struct RawDataInFlags(u8);

impl RawDataInFlags {
    #[inline]
    pub const fn raw(&self) -> u8 {
        self.0
    }

    #[inline]
    pub fn flags(&self) -> DataInFlags {
        DataInFlags::from_bits_retain(self.0)
    }

    #[inline]
    pub fn fin(&self) -> bool {
        self.flags().contains(DataInFlags::FINAL)
    }

    #[inline]
    pub fn o(&self) -> bool {
        self.flags().contains(DataInFlags::O)
    }

    #[inline]
    pub fn u(&self) -> bool {
        self.flags().contains(DataInFlags::U)
    }

    #[inline]
    pub fn s(&self) -> bool {
        self.flags().contains(DataInFlags::S)
    }

    #[inline]
    pub fn set(&mut self, f: DataInFlags, on: bool) {
        let mut cur = self.flags();
        cur.set(f, on);
        self.0 = cur.bits();
    }
}

/// Wire view for Data-Out flags (byte 1 of the PDU).
#[repr(transparent)]
#[derive(
    Default, Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable,
)]
pub struct RawDataOutFlags(u8);

impl RawDataOutFlags {
    #[inline]
    pub const fn raw(&self) -> u8 {
        self.0
    }

    #[inline]
    pub fn fin(&self) -> bool {
        self.0 & DataOutFlags::FINAL.bits() != 0
    }

    #[inline]
    pub fn set_fin(&mut self, on: bool) {
        if on {
            self.0 |= DataOutFlags::FINAL.bits();
        } else {
            self.0 &= !DataOutFlags::FINAL.bits();
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

bitflags::bitflags! {
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StageFlags: u8 {
        const FINAL     = 0b1000_0000; // bit7
        const CONTINUE  = 0b0100_0000; // bit6
    }
}

/// Zero-copy F/C byte of a Text PDU.
#[repr(transparent)]
#[derive(
    Default, Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable,
)]
pub struct RawStageFlags(u8);

impl RawStageFlags {
    #[inline]
    pub const fn raw(&self) -> u8 {
        self.0
    }

    #[inline]
    pub fn flags(&self) -> StageFlags {
        StageFlags::from_bits_retain(self.0)
    }

    #[inline]
    pub fn fin(&self) -> bool {
        self.flags().contains(StageFlags::FINAL)
    }

    #[inline]
    pub fn cont(&self) -> bool {
        self.flags().contains(StageFlags::CONTINUE)
    }

    #[inline]
    pub fn set(&mut self, f: StageFlags, on: bool) {
        let mut cur = self.flags();
        cur.set(f, on);
        self.0 = cur.bits();
    }
}

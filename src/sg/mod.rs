//! Scatter/gather buffers and the windowed views used to carve data
//! segments out of them.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Chunk planning for unsolicited bursts and R2T answers.
pub mod burst;
/// `SgList` and its borrowed windows.
pub mod list;

pub use burst::{Chunk, immediate_len, r2t_chunks, unsolicited_chunks};
pub use list::{SgList, SgWindow, SgWindowMut};

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Result, ensure};

/// One Data-Out PDU worth of payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub offset: usize,
    pub len: usize,
}

/// `min` where a zero limit means "no limit".
#[inline]
fn cap(limit: usize, v: usize) -> usize {
    if limit == 0 { v } else { v.min(limit) }
}

/// Bytes carried as immediate data on a write command.
pub fn immediate_len(
    trans_len: usize,
    immediate_data: bool,
    max_recv_data_segment_length: usize,
    first_burst_length: usize,
) -> usize {
    if !immediate_data {
        return 0;
    }
    cap(first_burst_length, cap(max_recv_data_segment_length, trans_len))
}

/// Unsolicited Data-Out chunks following `already_sent` bytes of immediate
/// data. Stops at `trans_len` or at the first-burst ceiling, whichever comes
/// first; the rest is left to R2T.
pub fn unsolicited_chunks(
    trans_len: usize,
    already_sent: usize,
    first_burst_length: usize,
    max_recv_data_segment_length: usize,
) -> Result<Vec<Chunk>> {
    let ceiling = cap(first_burst_length, trans_len);
    let mut out = Vec::new();
    let mut sent = already_sent;
    while sent < ceiling {
        let len = cap(max_recv_data_segment_length, ceiling - sent);
        ensure!(len > 0, "zero-length Data-Out chunk at offset {sent}");
        out.push(Chunk { offset: sent, len });
        sent += len;
    }
    Ok(out)
}

/// Data-Out chunks answering an R2T for `[offset, offset + len)`.
pub fn r2t_chunks(
    offset: usize,
    len: usize,
    max_recv_data_segment_length: usize,
) -> Result<Vec<Chunk>> {
    ensure!(len > 0, "R2T with zero desired length");
    let end = offset + len;
    let mut out = Vec::new();
    let mut at = offset;
    while at < end {
        let n = cap(max_recv_data_segment_length, end - at);
        ensure!(n > 0, "zero-length Data-Out chunk at offset {at}");
        out.push(Chunk { offset: at, len: n });
        at += n;
    }
    Ok(out)
}

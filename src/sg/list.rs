// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Result, bail, ensure};
use bytes::BytesMut;

/// An ordered list of owned byte segments addressed as one contiguous
/// buffer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SgList {
    segs: Vec<BytesMut>,
}

impl SgList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_segments(segs: Vec<BytesMut>) -> Self {
        Self { segs }
    }

    /// A single flat segment.
    pub fn flat(data: impl AsRef<[u8]>) -> Self {
        Self {
            segs: vec![BytesMut::from(data.as_ref())],
        }
    }

    /// Zero-filled segments of the given sizes, e.g. a read destination.
    pub fn zeroed(sizes: &[usize]) -> Self {
        Self {
            segs: sizes.iter().map(|n| BytesMut::zeroed(*n)).collect(),
        }
    }

    pub fn push(&mut self, seg: BytesMut) {
        self.segs.push(seg);
    }

    pub fn total_len(&self) -> usize {
        self.segs.iter().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    pub fn segments(&self) -> &[BytesMut] {
        &self.segs
    }

    /// Concatenation of every segment.
    pub fn flatten(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len());
        for s in &self.segs {
            out.extend_from_slice(s);
        }
        out
    }

    /// Walk to the segment holding `offset`, then emit `(segment, start, end)`
    /// triples until `len` bytes are covered; the last one is trimmed.
    fn plan(&self, offset: usize, len: usize) -> Result<Vec<(usize, usize, usize)>> {
        let total = self.total_len();
        let Some(end) = offset.checked_add(len) else {
            bail!("window {offset}+{len} overflows");
        };
        ensure!(
            end <= total,
            "window [{offset}, {end}) is outside buffer of {total} bytes"
        );

        let mut out = Vec::new();
        let mut base = 0usize;
        let mut left = len;
        for (idx, seg) in self.segs.iter().enumerate() {
            if left == 0 {
                break;
            }
            let seg_end = base + seg.len();
            if seg_end <= offset {
                base = seg_end;
                continue;
            }
            let start = offset.saturating_sub(base);
            let take = (seg.len() - start).min(left);
            if take > 0 {
                out.push((idx, start, start + take));
                left -= take;
            }
            base = seg_end;
        }
        Ok(out)
    }

    /// Borrowed view of `[offset, offset + len)`.
    pub fn window(&self, offset: usize, len: usize) -> Result<SgWindow<'_>> {
        let parts = self
            .plan(offset, len)?
            .into_iter()
            .map(|(idx, start, end)| &self.segs[idx][start..end])
            .collect();
        Ok(SgWindow { parts, len })
    }

    /// Mutable view of `[offset, offset + len)`.
    pub fn window_mut(&mut self, offset: usize, len: usize) -> Result<SgWindowMut<'_>> {
        let mut plan = self.plan(offset, len)?.into_iter().peekable();
        let mut parts = Vec::new();
        for (idx, seg) in self.segs.iter_mut().enumerate() {
            match plan.peek() {
                Some(&(want, start, end)) if want == idx => {
                    parts.push(&mut seg[start..end]);
                    plan.next();
                },
                Some(_) => {},
                None => break,
            }
        }
        Ok(SgWindowMut { parts, len })
    }

    /// Copy `src` into `[offset, offset + src.len())`.
    pub fn scatter_from(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        self.window_mut(offset, src.len())?.scatter(src)
    }
}

impl From<Vec<u8>> for SgList {
    fn from(v: Vec<u8>) -> Self {
        Self {
            segs: vec![BytesMut::from(&v[..])],
        }
    }
}

/// Read-only window over an [`SgList`].
#[derive(Debug)]
pub struct SgWindow<'a> {
    parts: Vec<&'a [u8]>,
    len: usize,
}

impl<'a> SgWindow<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        self.parts.iter().copied()
    }

    pub fn gather(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for p in &self.parts {
            out.extend_from_slice(p);
        }
        out
    }
}

/// Mutable window over an [`SgList`].
#[derive(Debug)]
pub struct SgWindowMut<'a> {
    parts: Vec<&'a mut [u8]>,
    len: usize,
}

impl<'a> SgWindowMut<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn parts_mut(&mut self) -> impl Iterator<Item = &mut [u8]> + '_ {
        self.parts.iter_mut().map(|p| &mut **p)
    }

    /// Fill the window from a flat source of exactly the window's length.
    pub fn scatter(&mut self, src: &[u8]) -> Result<()> {
        ensure!(
            src.len() == self.len,
            "source of {} bytes does not match window of {}",
            src.len(),
            self.len
        );
        let mut off = 0;
        for p in self.parts.iter_mut() {
            let n = p.len();
            p.copy_from_slice(&src[off..off + n]);
            off += n;
        }
        Ok(())
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use bytes::BytesMut;
use iscsi_initiator_rs::sg::{SgList, r2t_chunks, unsolicited_chunks};

/// Every way of cutting `total` bytes into non-empty segments.
fn compositions(total: usize) -> Vec<Vec<usize>> {
    if total == 0 {
        return vec![vec![]];
    }
    let mut out = Vec::new();
    for first in 1..=total {
        for mut rest in compositions(total - first) {
            rest.insert(0, first);
            out.push(rest);
        }
    }
    out
}

fn list_from(sizes: &[usize], data: &[u8]) -> SgList {
    let mut at = 0;
    let segs = sizes
        .iter()
        .map(|n| {
            let seg = BytesMut::from(&data[at..at + n]);
            at += n;
            seg
        })
        .collect();
    SgList::from_segments(segs)
}

#[test]
fn test_window_matches_flat_slice_for_every_split() -> Result<()> {
    const TOTAL: usize = 7;
    let data: Vec<u8> = (1..=TOTAL as u8).collect();

    for sizes in compositions(TOTAL) {
        let list = list_from(&sizes, &data);
        assert_eq!(list.total_len(), TOTAL);
        assert_eq!(list.flatten(), data);

        for offset in 0..=TOTAL {
            for len in 0..=TOTAL - offset {
                let w = list.window(offset, len)?;
                assert_eq!(w.len(), len);
                assert_eq!(
                    w.gather(),
                    &data[offset..offset + len],
                    "sizes {sizes:?} offset {offset} len {len}"
                );
                assert!(w.iter().all(|p| !p.is_empty()));
            }
        }
    }
    Ok(())
}

#[test]
fn test_scatter_writes_only_the_window() -> Result<()> {
    const TOTAL: usize = 6;
    for sizes in compositions(TOTAL) {
        for offset in 0..TOTAL {
            for len in 1..=TOTAL - offset {
                let mut list = SgList::zeroed(&sizes);
                let src: Vec<u8> = (0..len).map(|i| 0xa0 + i as u8).collect();
                list.scatter_from(offset, &src)?;

                let mut expected = vec![0u8; TOTAL];
                expected[offset..offset + len].copy_from_slice(&src);
                assert_eq!(list.flatten(), expected, "sizes {sizes:?} offset {offset}");
            }
        }
    }
    Ok(())
}

#[test]
fn test_window_outside_buffer_is_refused() {
    let list = SgList::zeroed(&[4, 4]);
    assert!(list.window(6, 3).is_err());
    assert!(list.window(9, 0).is_err());
    assert!(list.window(usize::MAX, 2).is_err());

    let mut list = SgList::zeroed(&[2]);
    assert!(list.scatter_from(1, &[1, 2]).is_err());
    let mut w = match list.window_mut(0, 2) {
        Ok(w) => w,
        Err(e) => panic!("window_mut failed: {e}"),
    };
    assert!(w.scatter(&[1]).is_err());
}

#[test]
fn test_unsolicited_chunks_cover_first_burst() -> Result<()> {
    for trans_len in [1usize, 100, 8192, 20_000, 70_000] {
        for imm in [0usize, 512, 8192] {
            if imm > trans_len {
                continue;
            }
            for (fbl, mrdsl) in [(65_536, 8192), (16_384, 4096), (0, 8192), (65_536, 0)] {
                let chunks = unsolicited_chunks(trans_len, imm, fbl, mrdsl)?;
                let ceiling = if fbl == 0 { trans_len } else { trans_len.min(fbl) };

                let mut at = imm;
                for c in &chunks {
                    assert_eq!(c.offset, at, "chunks must be contiguous");
                    assert!(c.len > 0);
                    assert!(mrdsl == 0 || c.len <= mrdsl);
                    at += c.len;
                }
                assert_eq!(at, ceiling.max(imm));
            }
        }
    }
    Ok(())
}

#[test]
fn test_r2t_chunks_cover_request() -> Result<()> {
    for (offset, len, mrdsl) in [(0, 1, 512), (8192, 11_808, 8192), (100, 4096, 1000), (0, 65_536, 0)] {
        let chunks = r2t_chunks(offset, len, mrdsl)?;
        let mut at = offset;
        for c in &chunks {
            assert_eq!(c.offset, at);
            assert!(mrdsl == 0 || c.len <= mrdsl);
            at += c.len;
        }
        assert_eq!(at, offset + len);
    }
    assert!(r2t_chunks(0, 0, 8192).is_err());
    Ok(())
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt::Write;

use anyhow::{Context, Result, bail};
use md5::{Digest, Md5};

/// Only MD5 (`CHAP_A=5`) is offered.
pub const CHAP_ALGORITHM_MD5: &str = "5";

/// `CHAP_R` as `0x` + upper-case hex of `MD5(id || secret || challenge)`.
pub fn calc_chap_r_hex(id: u8, secret: &[u8], challenge: &[u8]) -> String {
    let mut h = Md5::new();
    h.update([id]);
    h.update(secret);
    h.update(challenge);
    let d = h.finalize();

    let mut s = String::with_capacity(2 + d.len() * 2);
    s.push_str("0x");
    for b in d {
        let _ = write!(&mut s, "{b:02X}");
    }
    s
}

/// `CHAP_I` is a decimal identifier in 0..=255.
pub fn parse_chap_id(v: &str) -> Result<u8> {
    v.trim()
        .parse::<u8>()
        .with_context(|| format!("bad CHAP_I {v:?}"))
}

/// `CHAP_C` is hex, with or without a `0x` prefix.
pub fn parse_chap_challenge(v: &str) -> Result<Vec<u8>> {
    let s = v.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if s.is_empty() || s.len() % 2 != 0 {
        bail!("CHAP_C hex length must be even and non-zero, got {}", s.len());
    }
    hex::decode(s).with_context(|| format!("failed to decode CHAP_C: {s}"))
}

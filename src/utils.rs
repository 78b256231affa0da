// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt::Write;

/// Builds the ISID for a target slot and returns:
/// - `[u8; 6]` for direct use in the PDU
/// - `String` containing its hexadecimal representation (no prefix)
///
/// Layout: T=OUI-format (`0x00`), a fixed qualifier, and the slot index in the
/// low 16 bits so every slot owns a distinct session identity.
pub fn isid_for_target(target: usize) -> ([u8; 6], String) {
    let idx = (target as u16).to_be_bytes();
    let isid = [0x00, 0x02, 0x3d, 0x00, idx[0], idx[1]];

    let mut hex = String::with_capacity(12);
    for byte in &isid {
        let _ = write!(&mut hex, "{byte:02x}");
    }

    (isid, hex)
}

/// Render a key=value text segment (NUL separated) for logs.
pub fn text_for_log(data: &[u8]) -> String {
    data.split(|b| *b == 0)
        .filter(|kv| !kv.is_empty())
        .map(|kv| {
            let s = String::from_utf8_lossy(kv);
            if s.starts_with("CHAP_R=") || s.starts_with("CHAP_C=") {
                let key = s.split('=').next().unwrap_or_default().to_string();
                format!("{key}=<redacted>")
            } else {
                s.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

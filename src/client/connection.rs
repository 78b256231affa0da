// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    models::common::{HEADER_LEN, pad_len},
    sg::SgWindowMut,
};

/// Reads iSCSI framing off one direction of a TCP stream: a 48-byte BHS,
/// then AHS and a data segment padded to 4 bytes.
#[derive(Debug)]
pub struct FrameReader<R> {
    rd: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(rd: R) -> Self {
        Self { rd }
    }

    pub async fn read_header(&mut self) -> Result<[u8; HEADER_LEN]> {
        let mut buf = [0u8; HEADER_LEN];
        self.rd.read_exact(&mut buf).await.context("read BHS")?;
        Ok(buf)
    }

    /// Read a data segment of `len` bytes plus its padding; the padding is
    /// dropped.
    pub async fn read_segment(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len + pad_len(len)];
        self.rd
            .read_exact(&mut buf)
            .await
            .with_context(|| format!("read {len}-byte data segment"))?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Read a data segment straight into a scatter-gather window, then
    /// skip its padding.
    pub async fn read_into(&mut self, window: &mut SgWindowMut<'_>) -> Result<()> {
        let len = window.len();
        for part in window.parts_mut() {
            self.rd
                .read_exact(part)
                .await
                .context("read data segment into buffer")?;
        }
        self.skip(pad_len(len)).await
    }

    /// Throw away a data segment of `len` bytes and its padding.
    pub async fn discard(&mut self, len: usize) -> Result<()> {
        self.skip(len + pad_len(len)).await
    }

    /// Throw away exactly `n` bytes.
    pub async fn skip(&mut self, n: usize) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let copied = tokio::io::copy(&mut (&mut self.rd).take(n as u64), &mut tokio::io::sink())
            .await
            .context("skip bytes")?;
        anyhow::ensure!(copied == n as u64, "connection closed while skipping {n} bytes");
        Ok(())
    }

    pub fn into_inner(self) -> R {
        self.rd
    }
}

/// Write one PDU: the header, then every part of the data segment back to
/// back, then zero padding up to a 4-byte boundary. The parts are
/// gathered into one buffer so the PDU leaves in a single write.
pub async fn write_pdu<'a, W, I>(w: &mut W, header: &[u8; HEADER_LEN], parts: I) -> Result<()>
where
    W: AsyncWrite + Unpin,
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut buf = BytesMut::with_capacity(HEADER_LEN);
    buf.extend_from_slice(header);
    let mut body = 0usize;
    for p in parts {
        body += p.len();
        buf.extend_from_slice(p);
    }
    buf.extend_from_slice(&[0u8; 3][..pad_len(body)]);
    w.write_all(&buf).await.context("write PDU")?;
    Ok(())
}

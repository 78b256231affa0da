// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fmt, marker::PhantomData};

use anyhow::{Result, anyhow, bail};

use crate::models::common::{BasicHeaderSegment, HEADER_LEN, ZeroCopyType, pad_len};

/// An owned header plus its data segment, for the text-bearing PDUs
/// (login, text, NOP).
#[derive(PartialEq)]
pub struct PduWithData<T> {
    pub header_buf: [u8; HEADER_LEN],
    pub data: Vec<u8>,
    _marker: PhantomData<T>,
}

impl<T> PduWithData<T> {
    pub fn from_header_slice(header_buf: [u8; HEADER_LEN]) -> Self {
        Self {
            header_buf,
            data: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<T> PduWithData<T>
where
    T: BasicHeaderSegment + ZeroCopyType,
{
    /// Copy a built header into a fresh PDU.
    pub fn from_header(header: &T) -> Result<Self> {
        let mut header_buf = [0u8; HEADER_LEN];
        header.to_bhs_bytes(&mut header_buf)?;
        Ok(Self::from_header_slice(header_buf))
    }

    #[inline]
    pub fn header_view(&self) -> Result<&T> {
        T::ref_from_bytes(self.header_buf.as_slice()).map_err(|e| anyhow!("{e}"))
    }

    #[inline]
    pub fn header_view_mut(&mut self) -> Result<&mut T> {
        T::mut_from_bytes(self.header_buf.as_mut_slice()).map_err(|e| anyhow!("{e}"))
    }

    /// Appends raw bytes to the data segment and updates its length field.
    pub fn append_data(&mut self, more: &[u8]) -> Result<()> {
        self.data.extend_from_slice(more);
        let len = u32::try_from(self.data.len())?;
        self.header_view_mut()?.set_data_length_bytes(len);
        Ok(())
    }

    /// Final header plus the padded data segment. A zero
    /// `max_recv_data_segment_length` means no limit.
    pub fn build(
        &mut self,
        max_recv_data_segment_length: usize,
    ) -> Result<([u8; HEADER_LEN], Vec<u8>)> {
        if max_recv_data_segment_length != 0 && max_recv_data_segment_length < self.data.len()
        {
            bail!(
                "MaxRecvDataSegmentLength {max_recv_data_segment_length} is less than data \
                 len {}",
                self.data.len()
            );
        }
        if self.data.len() > 0x00ff_ffff {
            bail!("data segment of {} bytes does not fit 24 bits", self.data.len());
        }
        let len = self.data.len() as u32;
        self.header_view_mut()?.set_data_length_bytes(len);

        let mut body = Vec::with_capacity(self.data.len() + 3);
        body.extend_from_slice(&self.data);
        body.extend(std::iter::repeat_n(0u8, pad_len(self.data.len())));
        Ok((self.header_buf, body))
    }
}

struct HexPreview<'a>(&'a [u8]);

impl fmt::Debug for HexPreview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MAX: usize = 64;
        let slice = &self.0[..self.0.len().min(MAX)];
        write!(f, "\"{}", hex::encode(slice))?;
        if self.0.len() > MAX {
            write!(f, "... (+{} bytes)", self.0.len() - MAX)?;
        }
        write!(f, "\"")
    }
}

impl<T> fmt::Debug for PduWithData<T>
where
    T: BasicHeaderSegment + ZeroCopyType + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ds = f.debug_struct("PduWithData");
        match self.header_view() {
            Ok(h) => ds.field("header", h),
            Err(_) => ds.field("header_raw", &HexPreview(&self.header_buf)),
        };
        ds.field("data_len", &self.data.len());
        if !self.data.is_empty() {
            ds.field("data_preview", &HexPreview(&self.data));
        }
        ds.finish()
    }
}

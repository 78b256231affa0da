// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Result, bail, ensure};
use iscsi_initiator_rs::{
    client::command::{Command, ScsiArgs},
    initiator::InitiatorContext,
    models::{command::common::ScsiCommandRequestFlags, common::NO_TAG, parse::OutboundPdu},
    sg::SgList,
};
use tokio::{net::TcpListener, time::timeout};

use crate::integration_tests::common::{
    OPERATIONAL_ANSWER, STEP, TEST_IQN, TargetConn, custom_config, spawn_target, start_pair,
    start_pair_with,
};

const LEN: usize = 20_000;
const TTT: u32 = 0x0000_7700;

fn write10(lba: u32, blocks: u16) -> [u8; 16] {
    let mut cdb = [0u8; 16];
    cdb[0] = 0x2a;
    cdb[2..6].copy_from_slice(&lba.to_be_bytes());
    cdb[7..9].copy_from_slice(&blocks.to_be_bytes());
    cdb
}

#[tokio::test]
async fn write_with_immediate_data_and_r2t() -> Result<()> {
    let (listener, ctx) = start_pair(TEST_IQN).await?;
    let payload: Vec<u8> = (0..LEN).map(|i| (i * 7 % 256) as u8).collect();
    let expected = payload.clone();

    let target = spawn_target(listener, move |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        conn.login().await?;

        let req = conn.recv().await?;
        let OutboundPdu::ScsiCommandRequest(h) = &req.pdu else {
            bail!("expected a SCSI Command, got {:?}", req.pdu);
        };
        let flags = h.flags();
        ensure!(flags.contains(ScsiCommandRequestFlags::WRITE), "WRITE bit not set");
        // Only part of the data went out immediately, more is expected.
        ensure!(!flags.contains(ScsiCommandRequestFlags::FINAL), "F set with data left");
        ensure!(h.expected_data_transfer_length.get() as usize == LEN);
        ensure!(req.data.len() == 8192, "immediate data of {} bytes", req.data.len());
        let tag = req.tag();

        let mut received = vec![0u8; LEN];
        received[..8192].copy_from_slice(&req.data);

        conn.r2t(tag, TTT, 0, 8192, (LEN - 8192) as u32).await?;
        let burst = conn.data_out_burst(tag).await?;
        let offsets: Vec<u32> = burst.iter().map(|(o, _)| *o).collect();
        ensure!(offsets == vec![8192, 16384], "Data-Out offsets {offsets:?}");
        for (offset, data) in burst {
            let at = offset as usize;
            received[at..at + data.len()].copy_from_slice(&data);
        }
        ensure!(received == expected, "reassembled write differs");

        conn.scsi_response(tag, 0, &[]).await?;
        conn.serve_until_logout().await
    });

    let cmd = Command::scsi(0, ScsiArgs::write(0, write10(16, 40), SgList::flat(&payload)));
    let status = timeout(STEP, ctx.submit(cmd.clone())).await??;
    assert_eq!(status, 0);
    let (scsi_status, bytes_sent) = cmd.with_scsi(|a| (a.status, a.bytes_sent))?;
    assert_eq!(scsi_status, 0);
    assert_eq!(bytes_sent as usize, LEN);

    ctx.shutdown().await;
    target.await??;
    Ok(())
}

#[tokio::test]
async fn small_write_fits_in_immediate_data() -> Result<()> {
    let (listener, ctx) = start_pair(TEST_IQN).await?;

    let target = spawn_target(listener, |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        conn.login().await?;
        let req = conn.recv().await?;
        let OutboundPdu::ScsiCommandRequest(h) = &req.pdu else {
            bail!("expected a SCSI Command, got {:?}", req.pdu);
        };
        ensure!(h.flags().contains(ScsiCommandRequestFlags::FINAL), "F clear");
        ensure!(req.data == vec![0xa5; 512], "immediate payload mismatch");
        conn.scsi_response(req.tag(), 0, &[]).await?;
        conn.serve_until_logout().await
    });

    let cmd = Command::scsi(0, ScsiArgs::write(0, write10(0, 1), SgList::flat([0xa5; 512])));
    timeout(STEP, ctx.command(cmd)).await??;

    ctx.shutdown().await;
    target.await??;
    Ok(())
}

async fn start_unsolicited() -> Result<(TcpListener, Arc<InitiatorContext>)> {
    start_pair_with(|port| {
        custom_config(port, TEST_IQN, 1, "  InitialR2T: No\n", "  AuthMethod: None\n")
    })
    .await
}

#[tokio::test]
async fn unsolicited_data_stops_at_first_burst() -> Result<()> {
    const TOTAL: usize = 40_000;
    const FIRST_BURST: usize = 16_384;
    let (listener, ctx) = start_unsolicited().await?;
    let payload: Vec<u8> = (0..TOTAL).map(|i| (i * 13 % 251) as u8).collect();
    let expected = payload.clone();

    let target = spawn_target(listener, move |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        let answer = [
            OPERATIONAL_ANSWER,
            &b"InitialR2T=No\0ImmediateData=No\0FirstBurstLength=16384\0"[..],
        ]
        .concat();
        conn.login_with(&answer).await?;

        let req = conn.recv().await?;
        let OutboundPdu::ScsiCommandRequest(h) = &req.pdu else {
            bail!("expected a SCSI Command, got {:?}", req.pdu);
        };
        ensure!(
            !h.flags().contains(ScsiCommandRequestFlags::FINAL),
            "F set although unsolicited Data-Out follows"
        );
        ensure!(req.data.is_empty(), "immediate data without ImmediateData");
        let tag = req.tag();
        let mut received = vec![0u8; TOTAL];

        let first = conn.data_out_seq(tag).await?;
        let layout: Vec<(u32, u32, usize)> =
            first.iter().map(|d| (d.offset, d.data_sn, d.data.len())).collect();
        ensure!(
            layout == vec![(0, 0, 8192), (8192, 1, 8192)],
            "first burst {layout:?}"
        );
        ensure!(first.iter().all(|d| d.ttt == NO_TAG), "unsolicited Data-Out with a TTT");
        ensure!(first.iter().filter(|d| d.fin).count() == 1, "F only on the last PDU");
        for d in first {
            let at = d.offset as usize;
            received[at..at + d.data.len()].copy_from_slice(&d.data);
        }

        conn.r2t(tag, TTT, 0, FIRST_BURST as u32, (TOTAL - FIRST_BURST) as u32)
            .await?;
        let solicited = conn.data_out_seq(tag).await?;
        let layout: Vec<(u32, u32)> = solicited.iter().map(|d| (d.offset, d.data_sn)).collect();
        ensure!(
            layout == vec![(16384, 0), (24576, 1), (32768, 2)],
            "solicited burst {layout:?}"
        );
        ensure!(solicited.iter().all(|d| d.ttt == TTT), "Data-Out lost the TTT");
        for d in solicited {
            let at = d.offset as usize;
            received[at..at + d.data.len()].copy_from_slice(&d.data);
        }
        ensure!(received == expected, "reassembled write differs");

        conn.scsi_response(tag, 0, &[]).await?;
        conn.serve_until_logout().await
    });

    let cmd = Command::scsi(0, ScsiArgs::write(0, write10(0, 80), SgList::flat(&payload)));
    assert_eq!(timeout(STEP, ctx.submit(cmd.clone())).await??, 0);
    assert_eq!(cmd.with_scsi(|a| a.bytes_sent)? as usize, TOTAL);

    ctx.shutdown().await;
    target.await??;
    Ok(())
}

#[tokio::test]
async fn unsolicited_data_finishes_short_write() -> Result<()> {
    const TOTAL: usize = 12_000;
    let (listener, ctx) = start_unsolicited().await?;

    let target = spawn_target(listener, |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        conn.login_with(&[OPERATIONAL_ANSWER, &b"InitialR2T=No\0"[..]].concat())
            .await?;

        let req = conn.recv().await?;
        let OutboundPdu::ScsiCommandRequest(h) = &req.pdu else {
            bail!("expected a SCSI Command, got {:?}", req.pdu);
        };
        ensure!(!h.flags().contains(ScsiCommandRequestFlags::FINAL), "F set with data left");
        ensure!(req.data.len() == 8192, "immediate data of {} bytes", req.data.len());

        // Everything left fits in the first burst, so no R2T is needed.
        let rest = conn.data_out_seq(req.tag()).await?;
        ensure!(rest.len() == 1, "{} unsolicited PDUs", rest.len());
        ensure!(rest[0].offset == 8192 && rest[0].data_sn == 0 && rest[0].fin);
        ensure!(rest[0].data == vec![0x3c; TOTAL - 8192], "unsolicited payload mismatch");

        conn.scsi_response(req.tag(), 0, &[]).await?;
        conn.serve_until_logout().await
    });

    let cmd = Command::scsi(
        0,
        ScsiArgs::write(0, write10(0, 24), SgList::flat([0x3c; TOTAL])),
    );
    timeout(STEP, ctx.command(cmd.clone())).await??;
    assert_eq!(cmd.with_scsi(|a| a.bytes_sent)? as usize, TOTAL);

    ctx.shutdown().await;
    target.await??;
    Ok(())
}

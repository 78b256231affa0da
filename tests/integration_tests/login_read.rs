// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result, bail, ensure};
use iscsi_initiator_rs::{
    client::{
        command::{Command, ScsiArgs},
        session::SessionState,
    },
    models::{
        command::common::ScsiCommandRequestFlags, login::common::Stage, parse::OutboundPdu,
    },
};
use tokio::time::timeout;

use crate::integration_tests::common::{
    STEP, TEST_IQN, TargetConn, kv_pairs, spawn_target, start_pair,
};

fn read10(lba: u32, blocks: u16) -> [u8; 16] {
    let mut cdb = [0u8; 16];
    cdb[0] = 0x28;
    cdb[2..6].copy_from_slice(&lba.to_be_bytes());
    cdb[7..9].copy_from_slice(&blocks.to_be_bytes());
    cdb
}

#[tokio::test]
async fn read_after_plain_login() -> Result<()> {
    let (listener, ctx) = start_pair(TEST_IQN).await?;
    let payload: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
    let expected = payload.clone();

    let target = spawn_target(listener, move |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        let offer = conn.login().await?;
        let keys = kv_pairs(&offer);
        ensure!(
            keys.iter().any(|(k, v)| k == "TargetName" && v == TEST_IQN),
            "login offer lacks TargetName: {keys:?}"
        );
        ensure!(
            keys.iter().any(|(k, v)| k == "SessionType" && v == "Normal"),
            "login offer lacks SessionType=Normal: {keys:?}"
        );
        ensure!(
            conn.login_stages
                == vec![
                    (Some(Stage::Security), Some(Stage::Operational), true),
                    (Some(Stage::Operational), Some(Stage::FullFeature), true),
                ],
            "unexpected stage walk {:?}",
            conn.login_stages
        );

        let req = conn.recv().await?;
        let OutboundPdu::ScsiCommandRequest(h) = &req.pdu else {
            bail!("expected a SCSI Command, got {:?}", req.pdu);
        };
        ensure!(
            h.flags().contains(ScsiCommandRequestFlags::READ),
            "READ bit not set"
        );
        ensure!(h.expected_data_transfer_length.get() == 1024);
        let tag = req.tag();

        conn.data_in(tag, 0, 0, &payload[..512], None).await?;
        conn.data_in(tag, 1, 512, &payload[512..], Some(0)).await?;
        conn.serve_until_logout().await
    });

    let cmd = Command::scsi(0, ScsiArgs::read(0, read10(0, 2), 1024));
    let status = timeout(STEP, ctx.submit(cmd.clone())).await??;
    assert_eq!(status, 0);

    let (scsi_status, got, bytes_recv) =
        cmd.with_scsi(|a| (a.status, a.recv_data.flatten(), a.bytes_recv))?;
    assert_eq!(scsi_status, 0);
    assert_eq!(bytes_recv, 1024);
    assert_eq!(got, expected);

    let sess = ctx.session(0).context("no session after login")?;
    assert_eq!(sess.state(), SessionState::LoggedInNormal);
    assert_ne!(sess.tsih(), 0);
    assert!(ctx.info().contains("Normal session"));

    ctx.shutdown().await;
    target.await??;
    assert!(!ctx.has_session(0));
    Ok(())
}

#[tokio::test]
async fn check_condition_carries_sense() -> Result<()> {
    let (listener, ctx) = start_pair(TEST_IQN).await?;

    let target = spawn_target(listener, |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        conn.login().await?;
        let req = conn.recv().await?;
        // SenseLength + fixed sense: NOT READY, MEDIUM NOT PRESENT
        let mut sense = vec![0u8, 18, 0x70, 0, 0x02, 0, 0, 0, 0, 10];
        sense.extend_from_slice(&[0, 0, 0, 0, 0x3a, 0, 0, 0, 0, 0]);
        conn.scsi_response(req.tag(), 0x02, &sense).await?;
        conn.serve_until_logout().await
    });

    let cmd = Command::scsi(0, ScsiArgs::no_data(0, [0u8; 16]));
    let status = timeout(STEP, ctx.submit(cmd.clone())).await??;
    assert_eq!(status, 0);
    let (scsi_status, has_sense) = cmd.with_scsi(|a| (a.status, a.sense.is_some()))?;
    assert_eq!(scsi_status, 0x02);
    assert!(has_sense);

    ctx.shutdown().await;
    target.await??;
    Ok(())
}

#[tokio::test]
async fn unit_ready_reports_check_condition() -> Result<()> {
    let (listener, ctx) = start_pair(TEST_IQN).await?;

    let target = spawn_target(listener, |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        conn.login().await?;
        // NOT READY, MEDIUM NOT PRESENT first, GOOD once the medium is in
        let req = conn.recv().await?;
        let mut sense = vec![0u8, 18, 0x70, 0, 0x02, 0, 0, 0, 0, 10];
        sense.extend_from_slice(&[0, 0, 0, 0, 0x3a, 0, 0, 0, 0, 0]);
        conn.scsi_response(req.tag(), 0x02, &sense).await?;
        let req = conn.recv().await?;
        conn.scsi_response(req.tag(), 0, &[]).await?;
        conn.serve_until_logout().await
    });

    assert!(!timeout(STEP, ctx.unit_ready(0)).await??);
    assert!(timeout(STEP, ctx.unit_ready(0)).await??);

    ctx.shutdown().await;
    target.await??;
    Ok(())
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use iscsi_initiator_rs::{
    client::{
        command::{Command, ScsiArgs},
        session::SessionState,
    },
    error::InitiatorError,
    models::{common::HEADER_LEN, parse::OutboundPdu},
};
use tokio::{sync::oneshot, time::timeout};

use crate::integration_tests::common::{
    STEP, TEST_IQN, TargetConn, spawn_target, start_pair,
};

fn read_cmd(len: u32) -> std::sync::Arc<Command> {
    let mut cdb = [0u8; 16];
    cdb[0] = 0x28;
    Command::scsi(0, ScsiArgs::read(0, cdb, len))
}

#[tokio::test]
async fn destroy_fails_outstanding_commands() -> Result<()> {
    let (listener, ctx) = start_pair(TEST_IQN).await?;
    let (seen_tx, seen_rx) = oneshot::channel();

    let target = spawn_target(listener, |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        conn.login().await?;
        let ping = conn.recv().await?;
        conn.nop_in(&ping).await?;
        for _ in 0..2 {
            let req = conn.recv().await?;
            ensure!(matches!(req.pdu, OutboundPdu::ScsiCommandRequest(_)));
        }
        let _ = seen_tx.send(());
        // Never answered; the initiator tears the session down.
        ensure!(conn.closed().await, "connection left open");
        Ok(())
    });

    timeout(STEP, ctx.discover("", 0, 0)).await??;

    let (a, b) = (read_cmd(512), read_cmd(512));
    let (done_a, done_b) = (a.completion(), b.completion());
    ctx.enqueue(a.clone())?;
    ctx.enqueue(b.clone())?;
    timeout(STEP, seen_rx).await??;

    ctx.session_destroy(0).await?;
    assert_eq!(timeout(STEP, done_a).await??, -1);
    assert_eq!(timeout(STEP, done_b).await??, -1);
    assert!(!ctx.has_session(0));
    assert!(ctx.info().contains("No Session"));
    assert!(matches!(
        ctx.session_destroy(0).await.map_err(|e| e.downcast::<InitiatorError>()),
        Err(Ok(InitiatorError::NoSession(0)))
    ));

    ctx.shutdown().await;
    target.await??;
    Ok(())
}

#[tokio::test]
async fn unmatched_reject_keeps_session() -> Result<()> {
    let (listener, ctx) = start_pair(TEST_IQN).await?;

    let target = spawn_target(listener, |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        conn.login().await?;
        let ping = conn.recv().await?;
        conn.nop_in(&ping).await?;

        // A rejected SCSI Command whose tag the initiator never issued.
        let mut bad = [0u8; HEADER_LEN];
        bad[0] = 0x01;
        bad[16..20].copy_from_slice(&0xdead_beefu32.to_be_bytes());
        conn.reject(0x09, &bad).await?;

        let req = conn.recv().await?;
        let OutboundPdu::ScsiCommandRequest(_) = &req.pdu else {
            bail!("expected a SCSI Command, got {:?}", req.pdu);
        };
        conn.scsi_response(req.tag(), 0, &[]).await?;
        conn.serve_until_logout().await
    });

    timeout(STEP, ctx.discover("", 0, 0)).await??;
    // Give the receive worker time to process the Reject.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let info = ctx.target_info(0)?;
    assert!(!info.rx_error);
    let cmd = Command::scsi(0, ScsiArgs::no_data(0, [0u8; 16]));
    timeout(STEP, ctx.command(cmd)).await??;

    ctx.shutdown().await;
    target.await??;
    Ok(())
}

#[tokio::test]
async fn rejected_command_completes_with_error() -> Result<()> {
    let (listener, ctx) = start_pair(TEST_IQN).await?;

    let target = spawn_target(listener, |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        conn.login().await?;
        let req = conn.recv().await?;
        let mut bad = [0u8; HEADER_LEN];
        bad[0] = 0x01;
        bad[16..20].copy_from_slice(&req.tag().to_be_bytes());
        conn.reject(0x04, &bad).await?;
        conn.serve_until_logout().await
    });

    let cmd = Command::scsi(0, ScsiArgs::no_data(0, [0u8; 16]));
    assert_eq!(timeout(STEP, ctx.submit(cmd)).await??, -1);

    ctx.shutdown().await;
    target.await??;
    Ok(())
}

#[tokio::test]
async fn login_timeout_drops_command() -> Result<()> {
    let (listener, ctx) = start_pair(TEST_IQN).await?;

    let target = spawn_target(listener, |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        let req = conn.recv().await?;
        ensure!(matches!(req.pdu, OutboundPdu::LoginRequest(_)));
        // Silence until the initiator gives up.
        ensure!(conn.closed().await, "connection left open");
        Ok(())
    });

    let status = timeout(STEP, ctx.submit(read_cmd(512))).await??;
    assert_eq!(status, -1);
    assert!(!ctx.has_session(0));

    ctx.shutdown().await;
    target.await??;
    Ok(())
}

#[tokio::test]
async fn enqueue_after_shutdown_is_refused() -> Result<()> {
    let (_listener, ctx) = start_pair(TEST_IQN).await?;
    ctx.shutdown().await;

    let err = ctx.enqueue(read_cmd(512)).err();
    assert!(matches!(err, Some(InitiatorError::Shutdown)));
    assert!(matches!(
        ctx.enqueue(Command::scsi(7, ScsiArgs::no_data(0, [0u8; 16]))),
        Err(InitiatorError::InvalidCommand(_))
    ));
    Ok(())
}

#[tokio::test]
async fn aborted_command_fails_once_and_session_survives() -> Result<()> {
    let (listener, ctx) = start_pair(TEST_IQN).await?;
    let (seen_tx, seen_rx) = oneshot::channel();

    let target = spawn_target(listener, |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        conn.login().await?;
        let ping = conn.recv().await?;
        conn.nop_in(&ping).await?;
        let req = conn.recv().await?;
        ensure!(matches!(req.pdu, OutboundPdu::ScsiCommandRequest(_)));
        let _ = seen_tx.send(());
        conn.serve_until_logout().await
    });

    timeout(STEP, ctx.discover("", 0, 0)).await??;

    let cmd = read_cmd(4096);
    let done = cmd.completion();
    ctx.enqueue(cmd.clone())?;
    timeout(STEP, seen_rx).await??;

    ctx.abort(&cmd);
    assert_eq!(timeout(STEP, done).await??, -1);
    assert!(!cmd.complete(0), "an aborted command must not complete twice");
    assert!(ctx.has_session(0));

    let ping = Command::nop(0, 0, b"still here".to_vec(), true);
    timeout(STEP, ctx.command(ping)).await??;

    ctx.shutdown().await;
    target.await??;
    Ok(())
}

#[tokio::test]
async fn explicit_session_init_connects_without_login() -> Result<()> {
    let (listener, ctx) = start_pair(TEST_IQN).await?;
    assert_eq!(ctx.max_targets(), 1);

    let target = spawn_target(listener, |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        ensure!(conn.closed().await, "connection left open");
        Ok(())
    });

    let sess = timeout(STEP, ctx.session_init(0)).await??;
    assert_eq!(sess.state(), SessionState::Connected);
    assert!(ctx.has_session(0));
    assert!(timeout(STEP, ctx.session_init(0)).await?.is_err());
    assert!(ctx.session_init(3).await.is_err());

    ctx.session_destroy(0).await?;
    assert!(!ctx.has_session(0));
    timeout(STEP, target).await???;

    ctx.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn abort_during_data_in_leaves_nothing_registered() -> Result<()> {
    let (listener, ctx) = start_pair(TEST_IQN).await?;
    let (tag_tx, tag_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel();

    let target = spawn_target(listener, |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        conn.login().await?;
        let ping = conn.recv().await?;
        conn.nop_in(&ping).await?;
        let req = conn.recv().await?;
        ensure!(matches!(req.pdu, OutboundPdu::ScsiCommandRequest(_)));
        let _ = tag_tx.send(());
        // The header is out, the payload waits until the command is aborted.
        conn.data_in_held(req.tag(), 0, &[0x5a; 512], release_rx).await?;
        conn.serve_until_logout().await
    });

    timeout(STEP, ctx.discover("", 0, 0)).await??;

    let cmd = read_cmd(1024);
    let done = cmd.completion();
    ctx.enqueue(cmd.clone())?;
    timeout(STEP, tag_rx).await??;
    assert!(matches!(
        ctx.enqueue(cmd.clone()),
        Err(InitiatorError::InvalidCommand(_))
    ));

    // Let the Rx side take the command off the tag table for the header.
    timeout(STEP, async {
        while ctx.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    ctx.abort(&cmd);
    assert_eq!(timeout(STEP, done).await??, -1);
    let _ = release_tx.send(());

    // The NOP-In comes after the payload, so the Data-In has been handled.
    let ping = Command::nop(0, 0, b"after".to_vec(), true);
    timeout(STEP, ctx.command(ping)).await??;

    assert_eq!(ctx.in_flight(), 0);
    let sess = ctx.session(0).context("session vanished")?;
    assert!(sess.outstanding.is_empty());
    assert!(sess.is_healthy());

    ctx.shutdown().await;
    target.await??;
    Ok(())
}

#[tokio::test]
async fn failed_command_can_be_submitted_again() -> Result<()> {
    let (listener, ctx) = start_pair(TEST_IQN).await?;
    drop(listener);

    let cmd = read_cmd(512);
    assert_eq!(timeout(STEP, ctx.submit(cmd.clone())).await??, -1);
    assert!(cmd.is_completed());

    // Nothing listens on the port, so the second try fails the same way.
    assert_eq!(timeout(STEP, ctx.submit(cmd.clone())).await??, -1);
    assert_eq!(cmd.status(), -1);
    assert!(!ctx.has_session(0));

    ctx.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn connect_failure_is_a_transport_error() -> Result<()> {
    let (listener, ctx) = start_pair(TEST_IQN).await?;
    drop(listener);

    let err = timeout(STEP, ctx.session_init(0))
        .await?
        .err()
        .context("connected to a closed port")?;
    assert!(matches!(
        err.downcast_ref::<InitiatorError>(),
        Some(InitiatorError::Transport(_))
    ));
    assert!(!ctx.has_session(0));

    ctx.shutdown().await;
    Ok(())
}

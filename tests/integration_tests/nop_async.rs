// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Result, bail, ensure};
use iscsi_initiator_rs::{
    client::command::Command,
    models::{common::NO_TAG, parse::OutboundPdu},
};
use tokio::time::{sleep, timeout};

use crate::integration_tests::common::{STEP, TEST_IQN, TargetConn, spawn_target, start_pair};

#[tokio::test]
async fn target_ping_is_echoed() -> Result<()> {
    let (listener, ctx) = start_pair(TEST_IQN).await?;

    let target = spawn_target(listener, |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        conn.login().await?;
        let ping = conn.recv().await?;
        conn.nop_in(&ping).await?;

        conn.ping(0x0000_0042, b"keepalive!").await?;
        let echo = conn.recv().await?;
        let OutboundPdu::NopOutRequest(h) = &echo.pdu else {
            bail!("expected a NOP-Out, got {:?}", echo.pdu);
        };
        ensure!(h.initiator_task_tag.get() == NO_TAG, "echo must not carry a task tag");
        ensure!(h.target_transfer_tag.get() == 0x0000_0042, "echo lost the transfer tag");
        ensure!(echo.data == b"keepalive!", "echo data differs");
        ensure!(h.opcode.i(), "echo must be immediate");

        conn.serve_until_logout().await
    });

    timeout(STEP, ctx.discover("", 0, 0)).await??;
    // A second ping through the fast path.
    let ping = Command::nop(0, 0, b"hello".to_vec(), true);
    timeout(STEP, ctx.command(ping)).await??;

    ctx.shutdown().await;
    target.await??;
    Ok(())
}

#[tokio::test]
async fn async_logout_request_is_honoured() -> Result<()> {
    let (listener, ctx) = start_pair(TEST_IQN).await?;

    let target = spawn_target(listener, |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        conn.login().await?;
        let ping = conn.recv().await?;
        conn.nop_in(&ping).await?;

        // SCSI async event first, which changes nothing.
        conn.async_event(0).await?;
        // Then ask the initiator to log out.
        conn.async_event(1).await?;
        let req = conn.recv().await?;
        let OutboundPdu::LogoutRequest(h) = &req.pdu else {
            bail!("expected a Logout Request, got {:?}", req.pdu);
        };
        ensure!(!h.opcode.i(), "logout must not be immediate");
        ensure!(conn.closed().await, "connection left open after logout");
        Ok(())
    });

    timeout(STEP, ctx.discover("", 0, 0)).await??;
    target.await??;

    // The worker exit is reaped by the dispatcher.
    timeout(STEP, async {
        while ctx.has_session(0) {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await?;

    ctx.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn status_table_lists_every_slot() -> Result<()> {
    let (_listener, ctx) = start_pair(TEST_IQN).await?;
    let info = ctx.info();
    assert!(info.starts_with("  TID"));
    assert!(info.contains(TEST_IQN));
    assert!(info.contains("127.0.0.1"));
    assert!(info.contains("(No Session)"));
    assert_eq!(info.lines().count(), 3);
    ctx.shutdown().await;
    Ok(())
}

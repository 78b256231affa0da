// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Result, bail, ensure};
use iscsi_initiator_rs::models::parse::OutboundPdu;
use tokio::time::timeout;

use crate::integration_tests::common::{
    STEP, TEST_IQN, TargetConn, bind, kv_pairs, spawn_target, start_pair,
};

const OTHER_IQN: &str = "iqn.2004-01.com.example:disk1";

#[tokio::test]
async fn send_targets_then_normal_login() -> Result<()> {
    let (listener, ctx) = start_pair("").await?;
    let port = listener.local_addr()?.port();

    let target = spawn_target(listener, move |l| async move {
        // Discovery session
        let mut conn = TargetConn::accept(&l).await?;
        let offer = conn.login().await?;
        let keys = kv_pairs(&offer);
        ensure!(
            keys.iter().any(|(k, v)| k == "SessionType" && v == "Discovery"),
            "expected a Discovery login: {keys:?}"
        );
        ensure!(
            !keys.iter().any(|(k, _)| k == "TargetName"),
            "Discovery login must not name a target"
        );

        let req = conn.recv().await?;
        let OutboundPdu::TextRequest(_) = &req.pdu else {
            bail!("expected a Text Request, got {:?}", req.pdu);
        };
        ensure!(kv_pairs(&req.data) == vec![("SendTargets".to_string(), "All".to_string())]);
        let answer = format!(
            "TargetName={TEST_IQN}\0TargetAddress=127.0.0.1:{port},1\0\
             TargetName={OTHER_IQN}\0TargetAddress=10.9.9.9:3260,1\0"
        );
        conn.text_response(req.tag(), answer.as_bytes(), true).await?;

        let req = conn.recv().await?;
        conn.logout_response(&req).await?;
        ensure!(conn.closed().await, "discovery connection left open");

        // Normal session to the discovered target
        let mut conn = TargetConn::accept(&l).await?;
        let offer = conn.login().await?;
        ensure!(
            kv_pairs(&offer).contains(&("TargetName".into(), TEST_IQN.into())),
            "normal login does not name the discovered target"
        );
        let ping = conn.recv().await?;
        conn.nop_in(&ping).await?;
        conn.serve_until_logout().await
    });

    timeout(STEP * 2, ctx.discover("", 0, 0)).await??;

    let t = ctx.target(0)?;
    assert_eq!(t.target_name, TEST_IQN);
    assert_eq!(t.host, "127.0.0.1");
    assert_eq!(t.port, port);
    assert_eq!(
        ctx.get_targets(0)?,
        vec![
            TEST_IQN.to_string(),
            format!("127.0.0.1:{port},1"),
            OTHER_IQN.to_string(),
            "10.9.9.9:3260,1".to_string(),
        ]
    );

    ctx.shutdown().await;
    target.await??;
    Ok(())
}

#[tokio::test]
async fn empty_send_targets_fails_command() -> Result<()> {
    let (listener, ctx) = start_pair("").await?;

    let target = spawn_target(listener, |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        conn.login().await?;
        let req = conn.recv().await?;
        conn.text_response(req.tag(), b"", true).await?;
        // The initiator gives up without logging out.
        ensure!(conn.closed().await, "connection left open");
        Ok(())
    });

    let res = timeout(STEP * 2, ctx.discover("", 0, 0)).await?;
    assert!(res.is_err());
    assert!(!ctx.has_session(0));
    assert_eq!(ctx.target(0)?.target_name, "");

    ctx.shutdown().await;
    target.await??;
    Ok(())
}

#[tokio::test]
async fn reconfigured_slot_logs_in_directly() -> Result<()> {
    let (_unused, ctx) = start_pair("").await?;
    let (listener, port) = bind().await?;
    ctx.configure_target(0, "127.0.0.1", port)?;
    ctx.set_target_name(0, OTHER_IQN)?;

    let target = spawn_target(listener, |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        let offer = conn.login().await?;
        let keys = kv_pairs(&offer);
        ensure!(
            keys.iter().any(|(k, v)| k == "SessionType" && v == "Normal"),
            "expected a Normal login: {keys:?}"
        );
        ensure!(
            keys.iter().any(|(k, v)| k == "TargetName" && v == OTHER_IQN),
            "configured name not offered: {keys:?}"
        );
        let ping = conn.recv().await?;
        conn.nop_in(&ping).await?;
        conn.serve_until_logout().await
    });

    timeout(STEP, ctx.discover("", 0, 0)).await??;
    let t = ctx.target(0)?;
    assert_eq!(t.port, port);
    assert_eq!(t.target_name, OTHER_IQN);
    assert!(ctx.set_target_name(5, OTHER_IQN).is_err());

    ctx.shutdown().await;
    target.await??;
    Ok(())
}

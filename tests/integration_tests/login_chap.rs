// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result, ensure};
use iscsi_initiator_rs::{
    client::session::SessionState,
    error::InitiatorError,
    initiator::login::full_feature_phase,
    models::{login::common::Stage, parse::OutboundPdu},
};
use tokio::time::timeout;

use crate::integration_tests::common::{
    STEP, TEST_IQN, TargetConn, custom_config, spawn_target, start_pair, start_pair_with,
};

const SECRET: &str = "verysecretpassword";

#[tokio::test]
async fn chap_login_reaches_full_feature() -> Result<()> {
    let (listener, ctx) = start_pair_with(|port| {
        let auth = format!("  AuthMethod: CHAP\n  username: user\n  secret: {SECRET}\n");
        custom_config(port, TEST_IQN, 1, "", &auth)
    })
    .await?;

    let target = spawn_target(listener, |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        let name = conn.login_chap(SECRET).await?;
        ensure!(name == "user", "CHAP_N={name}");
        ensure!(
            conn.login_stages.first() == Some(&(Some(Stage::Security), Some(Stage::Operational), true)),
            "first stage {:?}",
            conn.login_stages.first()
        );
        ensure!(conn.login_stages.len() == 4, "{} login rounds", conn.login_stages.len());
        conn.serve_until_logout().await
    });

    timeout(STEP, ctx.discover("", 0, 0)).await??;
    let sess = ctx.session(0).context("no session after login")?;
    assert_eq!(sess.state(), SessionState::LoggedInNormal);
    assert_eq!(sess.tsih(), 0x0101);

    ctx.shutdown().await;
    target.await??;
    Ok(())
}

#[tokio::test]
async fn chap_demanded_without_credentials_fails_login() -> Result<()> {
    let (listener, ctx) = start_pair(TEST_IQN).await?;

    let target = spawn_target(listener, |l| async move {
        let mut conn = TargetConn::accept(&l).await?;
        let req = conn.recv().await?;
        ensure!(matches!(req.pdu, OutboundPdu::LoginRequest(_)));
        conn.login_round(&req, false, Stage::Operational, 0, b"AuthMethod=CHAP\0")
            .await?;
        ensure!(conn.closed().await, "connection left open");
        Ok(())
    });

    let sess = timeout(STEP, ctx.session_init(0)).await??;
    let err = full_feature_phase(&sess, TEST_IQN, STEP)
        .await
        .err()
        .context("login without CHAP credentials succeeded")?;
    assert!(matches!(
        err.downcast_ref::<InitiatorError>(),
        Some(InitiatorError::Protocol(_))
    ));
    assert_eq!(sess.state(), SessionState::LoggingIn);

    ctx.session_destroy(0).await?;
    target.await??;
    ctx.shutdown().await;
    Ok(())
}

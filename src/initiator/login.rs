// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::{
    cfg::enums::SessionType,
    client::{
        command::{Command, CommandArgs, LoginArgs},
        session::{Session, SessionState},
    },
    error::InitiatorError,
    models::login::common::Stage,
    params::params_out,
    utils::text_for_log,
};

/// Run the Login conversation until the session leaves `LoggingIn`.
///
/// `text` is the first offer. Each round waits at most `limit` for its
/// response; a round that times out is aborted and fails the login. Every
/// round reuses the same Initiator Task Tag, as the target expects for one
/// login.
pub async fn login_phase(sess: &Session, text: Vec<u8>, limit: Duration) -> Result<()> {
    sess.set_state(SessionState::LoggingIn);
    sess.set_cmd_sn(0);

    let tag = sess.next_tag();
    let mut args = LoginArgs {
        transit: true,
        cont: false,
        csg: Stage::Security,
        nsg: Stage::Operational,
        isid: sess.isid,
        tsih: 0,
        cid: sess.cid,
        cmd_sn: 0,
        text,
    };

    let mut round = 0u32;
    while sess.state() == SessionState::LoggingIn {
        round += 1;
        debug!(round, csg = ?args.csg, nsg = ?args.nsg, text = %text_for_log(&args.text), "login round");

        let cmd = Command::new(sess.target, CommandArgs::Login(args));
        cmd.set_tag(tag);
        let status = sess
            .exchange(cmd.clone(), limit)
            .await
            .with_context(|| format!("login round {round}"))?;
        if status != 0 {
            return Err(InitiatorError::Protocol(format!(
                "login round {round} ended with status {status}"
            ))
            .into());
        }
        args = cmd.with_login(|a| a.clone())?;
    }

    let state = sess.state();
    if !matches!(
        state,
        SessionState::LoggedInNormal | SessionState::LoggedInDiscovery
    ) {
        return Err(InitiatorError::Protocol(format!("login ended in state {state}")).into());
    }
    info!(target = sess.target, rounds = round, tsih = sess.tsih(), "{state} established");
    Ok(())
}

/// Log in for a Normal session to `target_name`.
pub async fn full_feature_phase(sess: &Session, target_name: &str, limit: Duration) -> Result<()> {
    let text = {
        let mut params = sess.params();
        params_out(
            &mut params,
            sess.creds(),
            Some(SessionType::Normal),
            target_name,
            true,
        )?
    };
    login_phase(sess, text, limit).await
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Result, ensure};
use tracing::info;

use crate::{
    client::{
        command::{Command, CommandArgs, LogoutArgs},
        session::{Session, SessionState},
    },
    models::logout::common::LogoutReason,
};

/// Close the whole session with a Logout Request and wait for the answer.
pub async fn logout_phase(sess: &Session, limit: Duration) -> Result<()> {
    sess.set_state(SessionState::LoggingOut);

    let cmd = Command::new(
        sess.target,
        CommandArgs::Logout(LogoutArgs {
            reason: LogoutReason::CloseSession,
            cid: sess.cid,
            ..Default::default()
        }),
    );
    cmd.set_tag(sess.next_tag());

    let status = sess.exchange(cmd.clone(), limit).await?;
    ensure!(status == 0, "logout failed for target {}", sess.target);

    let (time2wait, time2retain) = cmd.with_logout(|a| (a.time2wait, a.time2retain))?;
    sess.set_state(SessionState::LoggedOut);
    info!(target = sess.target, time2wait, time2retain, "logged out");
    Ok(())
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    client::{
        command::{Command, CommandKind},
        session::{Session, SessionExit, SessionState},
    },
    initiator::{
        context::InitiatorContext,
        discovery::discovery_phase,
        login::full_feature_phase,
    },
};

/// Deliver queued commands one at a time, building, discovering and logging
/// in sessions on the way. Worker exits reported on `reaper` are handled
/// between commands. Returns the queue so the caller can fail what is left.
pub(crate) async fn run(
    ctx: Arc<InitiatorContext>,
    mut queue: mpsc::Receiver<Arc<Command>>,
    mut reaper: mpsc::UnboundedReceiver<SessionExit>,
    cancel: CancellationToken,
) -> mpsc::Receiver<Arc<Command>> {
    info!("dispatcher started");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(exit) = reaper.recv() => ctx.reap(exit).await,
            next = queue.recv() => {
                let Some(cmd) = next else { break };
                tokio::select! {
                    _ = cancel.cancelled() => {
                        cmd.complete(-1);
                        break;
                    },
                    _ = dispatch_one(&ctx, cmd.clone()) => {},
                }
            },
        }
    }
    info!("dispatcher stopped");
    queue
}

async fn dispatch_one(ctx: &InitiatorContext, cmd: Arc<Command>) {
    let index = cmd.target();
    cmd.set_tag(ctx.next_tag());
    debug!(target = index, tag = cmd.tag(), kind = ?cmd.kind(), "dispatching");

    if !matches!(cmd.kind(), CommandKind::Scsi | CommandKind::Nop) {
        error!(target = index, kind = ?cmd.kind(), "command type cannot be dispatched");
        cmd.complete(-1);
        return;
    }

    let sess = match prepare(ctx, index).await {
        Ok(sess) => sess,
        Err(e) => {
            error!(target = index, "dropping command: {e:#}");
            cmd.complete(-1);
            return;
        },
    };

    if let Err(e) = sess.queue(cmd.clone()) {
        error!(target = index, "Tx queue refused command: {e}");
        cmd.complete(-1);
    }
}

/// Make sure `index` has a healthy, logged-in Normal session.
async fn prepare(ctx: &InitiatorContext, index: usize) -> Result<Arc<Session>> {
    let limit = ctx.login_timeout();
    loop {
        let sess = match ctx.session(index) {
            Some(s) if s.is_healthy() && s.state() != SessionState::Destroying => s,
            Some(s) => {
                warn!(target = index, "rebuilding failed session");
                ctx.destroy(&s).await;
                continue;
            },
            None => ctx.session_init(index).await?,
        };

        let target = ctx.target(index)?;
        if target.target_name.is_empty() {
            info!(target = index, "no TargetName, running discovery");
            let res = discovery_phase(&sess, &target.iqn_wanted, limit).await;
            ctx.destroy(&sess).await;
            ctx.apply_discovery(index, res.context("discovery failed")?)?;
            continue;
        }

        if sess.state() != SessionState::LoggedInNormal {
            if let Err(e) = full_feature_phase(&sess, &target.target_name, limit).await {
                ctx.destroy(&sess).await;
                return Err(e.context(format!("login to {} failed", target.target_name)));
            }
        }

        sess.refresh_snapshot()?;
        return Ok(sess);
    }
}

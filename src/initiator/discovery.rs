// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use tracing::{debug, info};

use crate::{
    cfg::enums::SessionType,
    client::{
        command::{Command, CommandArgs, TextArgs},
        session::{Session, SessionState},
    },
    error::TargetAddressError,
    initiator::{login::login_phase, logout::logout_phase},
    models::common::ISCSI_PORT,
    params::{ParamList, params_out},
};

/// What one SendTargets exchange resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    pub target_name: String,
    pub host: String,
    pub port: u16,
    /// Every reported target as `name, address, name, address, ...`.
    pub all_targets: Vec<String>,
}

/// Split a `TargetAddress` of the form `host[:port],portal-group-tag`.
///
/// IPv6 hosts come bracketed (`[fe80::1]:3261,1`). Without a port the
/// well-known iSCSI port is assumed.
pub fn parse_target_address(addr: &str) -> Result<(String, u16), TargetAddressError> {
    if addr.is_empty() {
        return Err(TargetAddressError::Empty);
    }
    let (hostport, _tpgt) = addr
        .split_once(',')
        .ok_or_else(|| TargetAddressError::MissingComma(addr.to_string()))?;

    let (host, port) = if let Some(rest) = hostport.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| TargetAddressError::BadPort(addr.to_string()))?;
        match after.strip_prefix(':') {
            Some(p) => (host, Some(p)),
            None if after.is_empty() => (host, None),
            None => return Err(TargetAddressError::BadPort(addr.to_string())),
        }
    } else {
        match hostport.split_once(':') {
            Some((h, p)) => (h, Some(p)),
            None => (hostport, None),
        }
    };

    if host.is_empty() {
        return Err(TargetAddressError::Empty);
    }
    let port = match port {
        Some(p) => p
            .parse::<u16>()
            .map_err(|_| TargetAddressError::BadPort(addr.to_string()))?,
        None => ISCSI_PORT,
    };
    Ok((host.to_string(), port))
}

/// Log in as a Discovery session, ask for `SendTargets=All`, pick a target
/// and log out again.
///
/// With an empty `iqn_wanted` the first reported target is taken.
pub async fn discovery_phase(
    sess: &Session,
    iqn_wanted: &str,
    limit: Duration,
) -> Result<Discovered> {
    let text = {
        let mut params = sess.params();
        params_out(
            &mut params,
            sess.creds(),
            Some(SessionType::Discovery),
            "",
            true,
        )?
    };
    login_phase(sess, text, limit).await?;
    ensure!(
        sess.state() == SessionState::LoggedInDiscovery,
        "target {} did not open a Discovery session",
        sess.target
    );

    let mut text = Vec::new();
    ParamList::text_add("SendTargets", "All", &mut text);
    sess.params().parse(sess.creds(), &text, true)?;
    text_exchange(sess, text, limit).await?;

    let all_targets = {
        let params = sess.params();
        let addrs = params.values("TargetAddress");
        params
            .values("TargetName")
            .iter()
            .enumerate()
            .flat_map(|(i, name)| {
                [
                    name.clone(),
                    addrs.get(i).cloned().unwrap_or_default(),
                ]
            })
            .collect::<Vec<_>>()
    };
    debug!(targets = ?all_targets, "SendTargets");

    let pair = if iqn_wanted.is_empty() {
        all_targets.chunks_exact(2).next()
    } else {
        all_targets
            .chunks_exact(2)
            .find(|pair| pair[0] == iqn_wanted)
    };
    let (target_name, address) = match pair {
        Some([name, address]) => (name.clone(), address.clone()),
        _ if iqn_wanted.is_empty() => bail!("SendTargets returned no targets"),
        _ => bail!("SendTargets failed - target `{iqn_wanted}' not found"),
    };

    ensure!(!target_name.is_empty(), "SendTargets reported an empty TargetName");
    let (host, port) = parse_target_address(&address)
        .with_context(|| format!("target {target_name} is not allowing access"))?;
    info!(target_name = %target_name, host = %host, port, "discovered target");

    logout_phase(sess, limit).await?;

    Ok(Discovered {
        target_name,
        host,
        port,
        all_targets,
    })
}

/// Run Text Request / Response rounds until the target sets the Final bit.
async fn text_exchange(sess: &Session, text: Vec<u8>, limit: Duration) -> Result<()> {
    let mut text = text;
    loop {
        let cmd = Command::new(sess.target, CommandArgs::Text(TextArgs::new(text)));
        cmd.set_tag(sess.next_tag());
        let status = sess.exchange(cmd.clone(), limit).await?;
        ensure!(status == 0, "Text exchange failed");

        let (fin, next) = cmd.with_text(|a| (a.final_bit, std::mem::take(&mut a.text)))?;
        if fin {
            return Ok(());
        }
        text = next;
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use iscsi_initiator_rs::{
    cfg::{cli::parse_args, config::Config, logger::init_logger},
    initiator::InitiatorContext,
};
use tokio::main;
use tracing::{error, info, warn};

#[main]
async fn main() -> Result<()> {
    let paths = parse_args(std::env::args().skip(1))?;
    let _init_logger = init_logger(&paths.logger.to_string_lossy())?;

    let config =
        Config::load_from_file(&paths.config).context("failed to load config")?;

    let ctx = InitiatorContext::start(&config)?;

    for target in 0..config.targets.len() {
        if let Err(e) = ctx.discover("", target, 0).await {
            error!(target, "discover failed: {e:#}");
            continue;
        }
        match ctx.unit_ready(target).await {
            Ok(true) => info!(target, "unit ready"),
            Ok(false) => warn!(target, "unit not ready"),
            Err(e) => error!(target, "TEST UNIT READY failed: {e:#}"),
        }
    }

    info!("\n{}", ctx.info());
    ctx.shutdown().await;
    Ok(())
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

pub const DEFAULT_CONFIG: &str = "tests/config.yaml";
pub const DEFAULT_LOGGER_CONFIG: &str = "tests/config_logger.yaml";

/// Config files the initiator binary starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliPaths {
    pub config: PathBuf,
    pub logger: PathBuf,
}

/// `iscsi-initiator-rs [CONFIG [LOGGER_CONFIG]]`, both resolved to
/// canonical paths.
pub fn parse_args<I>(args: I) -> Result<CliPaths>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let config = args.next().unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let logger = args
        .next()
        .unwrap_or_else(|| DEFAULT_LOGGER_CONFIG.to_string());
    if let Some(extra) = args.next() {
        bail!("unexpected argument {extra:?}");
    }

    Ok(CliPaths {
        config: resolve_config_path(&config)?,
        logger: resolve_config_path(&logger)?,
    })
}

/// Turn `rel` into an absolute, symlink-free path; relative paths are
/// taken from the working directory. The file must exist.
pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    if rel.trim().is_empty() {
        bail!("empty config path");
    }
    let p = Path::new(rel);
    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    abs.canonicalize()
        .with_context(|| format!("config file {abs:?} not found"))
}

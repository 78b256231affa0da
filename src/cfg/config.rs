// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    cfg::enums::{Digest, YesNo},
    models::common::ISCSI_PORT,
};

/// Default initiator IQN, offered when the config leaves it out.
pub const DEFAULT_INITIATOR_NAME: &str = "iqn.1994-04.org.NetBSD:iscsi-initiator";

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Identity offered during the Security stage.
    pub initiator: InitiatorConfig,
    /// Authentication strategy (AuthMethod / CHAP).
    #[serde(default)]
    pub auth: AuthConfig,
    /// Statically configured targets, one per slot.
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    /// Engine limits and timeouts that never travel on the wire.
    pub runtime: RuntimeConfig,
}

/// Initiator identity.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InitiatorConfig {
    #[serde(rename = "InitiatorName", default = "default_initiator_name")]
    pub initiator_name: String,

    #[serde(rename = "InitiatorAlias", default)]
    pub initiator_alias: String,

    #[serde(rename = "Digest", default)]
    /// Header/Data digest preference. Only `None` is supported.
    pub digest: Digest,

    #[serde(rename = "InitialR2T", default = "default_initial_r2t")]
    /// `No` lets writes carry unsolicited Data-Out up to FirstBurstLength.
    /// A target answering `Yes` still wins.
    pub initial_r2t: YesNo,
}

fn default_initiator_name() -> String {
    DEFAULT_INITIATOR_NAME.to_string()
}

fn default_initial_r2t() -> YesNo {
    YesNo::Yes
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(tag = "AuthMethod")]
/// Authentication configuration exposed through the Login AuthMethod key.
pub enum AuthConfig {
    #[default]
    #[serde(rename = "None")]
    None,
    #[serde(rename = "CHAP")]
    Chap(ChapConfig),
}

#[derive(Deserialize, Serialize, Debug, Clone)]
/// CHAP credentials used during challenge-response authentication.
pub struct ChapConfig {
    /// Username advertised via CHAP_N.
    pub username: String,
    /// Shared secret used to generate CHAP_R.
    pub secret: String,
    #[serde(rename = "MutualAuth", default)]
    /// Carried with the credentials; the initiator never challenges the
    /// target.
    pub mutual_auth: YesNo,
}

/// One configured target slot.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TargetConfig {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "Port", default = "default_port")]
    pub port: u16,
    #[serde(rename = "TargetName", default)]
    /// IQN to log in to; empty asks for a discovery session first.
    pub target_name: String,
}

fn default_port() -> u16 {
    ISCSI_PORT
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    #[serde(rename = "MaxTargets")]
    /// Number of target slots, which is also the session pool size.
    pub max_targets: usize,

    #[serde(rename = "QueueDepth", default = "default_queue_depth")]
    /// Capacity of the enqueue queue and of every session Tx queue.
    pub queue_depth: usize,

    #[serde(
        rename = "LoginTimeout",
        with = "serde_secs",
        default = "default_login_timeout"
    )]
    /// Bound on one login / logout / text round trip.
    pub login_timeout: Duration,

    #[serde(rename = "TimeoutConnection", with = "serde_secs")]
    /// Timeout for establishing the TCP connection.
    pub timeout_connection: Duration,
}

fn default_queue_depth() -> usize {
    64
}

fn default_login_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read {:?}", path.as_ref()))?;
        Self::from_yaml_str(&s)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let mut cfg: Config =
            serde_yaml::from_str(s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        if self.initiator.initiator_name.trim().is_empty() {
            self.initiator.initiator_name = default_initiator_name();
        }
        ensure!(
            self.initiator.digest == Digest::None,
            "only Digest=None is supported, got {}",
            self.initiator.digest
        );

        if let AuthConfig::Chap(chap) = &self.auth {
            ensure!(!chap.username.is_empty(), "CHAP username must not be empty");
            ensure!(!chap.secret.is_empty(), "CHAP secret must not be empty");
        }

        ensure!(self.runtime.max_targets >= 1, "MaxTargets must be >= 1");
        ensure!(self.runtime.queue_depth >= 1, "QueueDepth must be >= 1");
        ensure!(
            !self.runtime.login_timeout.is_zero(),
            "LoginTimeout must be > 0"
        );
        ensure!(!self.targets.is_empty(), "at least one target is required");
        ensure!(
            self.targets.len() <= self.runtime.max_targets,
            "{} targets configured but MaxTargets is {}",
            self.targets.len(),
            self.runtime.max_targets
        );

        for (i, t) in self.targets.iter_mut().enumerate() {
            ensure!(!t.host.is_empty(), "target {i}: Host must not be empty");
            if t.port == 0 {
                t.port = ISCSI_PORT;
            }
            if t.name.is_empty() {
                t.name = format!("target{i}");
            }
        }

        Ok(())
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

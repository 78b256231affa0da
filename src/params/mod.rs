//! iSCSI text-key negotiation: the parameter table, the login offers built
//! from it and the CHAP responder.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// CHAP (MD5) challenge handling.
pub mod chap;
/// Parameter table and the negotiation rules.
pub mod list;
/// Login offers for the Security and Operational stages.
pub mod offer;

use crate::cfg::config::AuthConfig;
pub use list::{Param, ParamList, ParamType};
pub use offer::params_out;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    #[default]
    None,
    Chap,
}

/// Per-slot authentication settings. They survive session reuse.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub auth_type: AuthType,
    pub username: String,
    pub secret: String,
    pub mutual_auth: bool,
}

impl From<&AuthConfig> for Credentials {
    fn from(a: &AuthConfig) -> Self {
        match a {
            AuthConfig::None => Self::default(),
            AuthConfig::Chap(c) => Self {
                auth_type: AuthType::Chap,
                username: c.username.clone(),
                secret: c.secret.clone(),
                mutual_auth: c.mutual_auth.as_bool(),
            },
        }
    }
}

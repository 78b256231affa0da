// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};

use crate::{
    cfg::enums::SessionType,
    params::{AuthType, Credentials, ParamList},
};

/// Operational keys offered once security is done. Ordering keys are offered
/// as `No`; the BinaryOr outcome still honours a target that insists on
/// `Yes`.
const OPERATIONAL_KEYS: [&str; 12] = [
    "HeaderDigest",
    "DataDigest",
    "MaxConnections",
    "InitialR2T",
    "ImmediateData",
    "MaxRecvDataSegmentLength",
    "FirstBurstLength",
    "MaxBurstLength",
    "DefaultTime2Wait",
    "DefaultTime2Retain",
    "MaxOutstandingR2T",
    "ErrorRecoveryLevel",
];

/// Build the key=value offer for a Login Request and record it as our
/// outgoing offer. `session_type == None` omits SessionType and TargetName.
pub fn params_out(
    list: &mut ParamList,
    creds: &Credentials,
    session_type: Option<SessionType>,
    target_name: &str,
    security: bool,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    if security {
        for key in ["InitiatorName", "InitiatorAlias"] {
            let v = list.value(key).unwrap_or_default().to_string();
            if !v.is_empty() {
                ParamList::text_add(key, &v, &mut out);
            }
        }
        let auth = match creds.auth_type {
            AuthType::Chap => "CHAP,None",
            AuthType::None => "None",
        };
        ParamList::text_add("AuthMethod", auth, &mut out);
    } else {
        for key in OPERATIONAL_KEYS {
            let v = list
                .value(key)
                .with_context(|| format!("{key} missing from parameter list"))?
                .to_string();
            ParamList::text_add(key, &v, &mut out);
        }
        ParamList::text_add("DataPDUInOrder", "No", &mut out);
        ParamList::text_add("DataSequenceInOrder", "No", &mut out);
    }

    if let Some(st) = session_type {
        ParamList::text_add("SessionType", &st.to_string(), &mut out);
        if st.is_normal() {
            ParamList::text_add("TargetName", target_name, &mut out);
        }
    }

    list.parse(creds, &out, true)?;
    Ok(out)
}

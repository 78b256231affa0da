// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result, anyhow, bail, ensure};
use tracing::{debug, warn};

use crate::{
    cfg::{config::DEFAULT_INITIATOR_NAME, enums::YesNo},
    params::{
        AuthType, Credentials,
        chap::{CHAP_ALGORITHM_MD5, calc_chap_r_hex, parse_chap_challenge, parse_chap_id},
    },
};

/// How a key's outcome is computed (RFC 3720 §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// first of our offers that appears in the peer's list
    List,
    /// minimum of both sides
    Numerical,
    /// minimum, where 0 means unlimited
    NumericalZ,
    /// Yes if either side says Yes
    BinaryOr,
    /// Yes only if both sides say Yes
    BinaryAnd,
    /// peer's value wins
    Declarative,
    /// every value is kept
    DeclareMulti,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub key: String,
    pub ty: ParamType,
    pub dflt: String,
    pub valid: String,
    values: Vec<String>,
    /// What we last put on the wire for this key, awaiting an answer.
    offer: Option<String>,
}

impl Param {
    fn new(ty: ParamType, key: &str, dflt: &str, valid: &str) -> Self {
        let values = match ty {
            ParamType::DeclareMulti => Vec::new(),
            _ => vec![dflt.to_string()],
        };
        Self {
            key: key.to_string(),
            ty,
            dflt: dflt.to_string(),
            valid: valid.to_string(),
            values,
            offer: None,
        }
    }
}

/// Answers that leave a key at its default.
const NEUTRAL_ANSWERS: [&str; 3] = ["NotUnderstood", "Irrelevant", "Reject"];

fn parse_num(key: &str, v: &str) -> Result<u64> {
    v.trim()
        .parse::<u64>()
        .with_context(|| format!("{key}: {v:?} is not a number"))
}

fn parse_bool(key: &str, v: &str) -> Result<bool> {
    YesNo::from_wire(v)
        .map(YesNo::as_bool)
        .ok_or_else(|| anyhow!("{key}: {v:?} is not Yes/No"))
}

/// The negotiable-parameter table of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamList {
    params: Vec<Param>,
}

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, ty: ParamType, key: &str, dflt: &str, valid: &str) {
        if let Some(p) = self.find_mut(key) {
            *p = Param::new(ty, key, dflt, valid);
        } else {
            self.params.push(Param::new(ty, key, dflt, valid));
        }
    }

    /// The default initiator offer table.
    pub fn default_initiator_list(initiator_name: &str, initiator_alias: &str) -> Self {
        use ParamType::*;

        let name = if initiator_name.is_empty() {
            DEFAULT_INITIATOR_NAME
        } else {
            initiator_name
        };

        let mut l = Self::new();
        l.add(List, "AuthMethod", "None", "CHAP,None");
        l.add(List, "CHAP_A", "None", CHAP_ALGORITHM_MD5);
        l.add(Declarative, "CHAP_N", "", "");
        l.add(Declarative, "CHAP_R", "", "");
        l.add(Declarative, "CHAP_I", "", "");
        l.add(Declarative, "CHAP_C", "", "");
        l.add(List, "HeaderDigest", "None", "None");
        l.add(List, "DataDigest", "None", "None");
        l.add(Numerical, "MaxConnections", "1", "1");
        l.add(Declarative, "SendTargets", "", "");
        l.add(DeclareMulti, "TargetName", "", "");
        l.add(Declarative, "InitiatorName", name, "");
        l.add(Declarative, "TargetAlias", "", "");
        l.add(Declarative, "InitiatorAlias", initiator_alias, "");
        l.add(DeclareMulti, "TargetAddress", "", "");
        l.add(Declarative, "TargetPortalGroupTag", "1", "65535");
        l.add(BinaryOr, "InitialR2T", "Yes", "Yes,No");
        l.add(BinaryAnd, "ImmediateData", "Yes", "Yes,No");
        l.add(NumericalZ, "MaxRecvDataSegmentLength", "8192", "16777215");
        l.add(NumericalZ, "MaxBurstLength", "262144", "16777215");
        l.add(NumericalZ, "FirstBurstLength", "65536", "16777215");
        l.add(Numerical, "DefaultTime2Wait", "2", "2");
        l.add(Numerical, "DefaultTime2Retain", "20", "20");
        l.add(Numerical, "MaxOutstandingR2T", "1", "1");
        l.add(BinaryOr, "DataPDUInOrder", "Yes", "Yes,No");
        l.add(BinaryOr, "DataSequenceInOrder", "Yes", "Yes,No");
        l.add(Numerical, "ErrorRecoveryLevel", "0", "0");
        l.add(Declarative, "SessionType", "Normal", "Normal,Discovery");
        l
    }

    pub fn find(&self, key: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.key == key)
    }

    fn find_mut(&mut self, key: &str) -> Option<&mut Param> {
        self.params.iter_mut().find(|p| p.key == key)
    }

    /// Appends `key=value\0`.
    pub fn text_add(key: &str, value: &str, out: &mut Vec<u8>) {
        out.extend_from_slice(key.as_bytes());
        out.push(b'=');
        out.extend_from_slice(value.as_bytes());
        out.push(0);
    }

    /// First (or only) current value.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.value_at(key, 0)
    }

    pub fn value_at(&self, key: &str, idx: usize) -> Option<&str> {
        self.find(key)?.values.get(idx).map(String::as_str)
    }

    pub fn values(&self, key: &str) -> &[String] {
        self.find(key).map(|p| p.values.as_slice()).unwrap_or_default()
    }

    /// Overwrite the current value (e.g. InitiatorName from config).
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let p = self
            .find_mut(key)
            .with_context(|| format!("unknown key {key}"))?;
        p.values = vec![value.to_string()];
        Ok(())
    }

    /// Back to the default; multi-valued keys become empty.
    pub fn reset(&mut self, key: &str) {
        if let Some(p) = self.find_mut(key) {
            p.offer = None;
            p.values = match p.ty {
                ParamType::DeclareMulti => Vec::new(),
                _ => vec![p.dflt.clone()],
            };
        }
    }

    pub fn num_value(&self, key: &str) -> Result<u32> {
        let v = self.value(key).with_context(|| format!("{key} has no value"))?;
        let n = parse_num(key, v)?;
        u32::try_from(n).with_context(|| format!("{key}={n} overflows u32"))
    }

    pub fn bool_value(&self, key: &str) -> Result<bool> {
        let v = self.value(key).with_context(|| format!("{key} has no value"))?;
        parse_bool(key, v)
    }

    /// Parse one `key=value\0...` text blob.
    ///
    /// With `outgoing` set, the pairs are our own offers: they are recorded
    /// and declaratives are committed. Otherwise the pairs come from the
    /// target and the returned bytes are our answer (possibly empty).
    pub fn parse(&mut self, creds: &Credentials, text: &[u8], outgoing: bool) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut chap_id = None;
        let mut chap_challenge = None;

        for raw in text.split(|b| *b == 0).filter(|kv| !kv.is_empty()) {
            let kv = std::str::from_utf8(raw).context("negotiation text is not UTF-8")?;
            let (key, value) = kv
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed key=value pair {kv:?}"))?;
            ensure!(!key.is_empty(), "empty key in {kv:?}");

            if outgoing {
                self.record_offer(key, value)?;
                continue;
            }

            let Some(p) = self.find_mut(key) else {
                warn!(key, "target sent a key we do not understand");
                Self::text_add(key, "NotUnderstood", &mut out);
                continue;
            };

            if NEUTRAL_ANSWERS.contains(&value) {
                debug!(key, value, "neutral answer, keeping default");
                p.offer = None;
                continue;
            }

            let was_offered = p.offer.take();
            match p.ty {
                ParamType::Declarative => p.values = vec![value.to_string()],
                ParamType::DeclareMulti => p.values.push(value.to_string()),
                ParamType::Numerical | ParamType::NumericalZ => {
                    let theirs = parse_num(key, value)?;
                    let ours_txt = match (&was_offered, p.values.first()) {
                        (Some(o), _) | (None, Some(o)) => o.as_str(),
                        (None, None) => p.dflt.as_str(),
                    };
                    let ours = parse_num(key, ours_txt)?;
                    let result = if p.ty == ParamType::NumericalZ {
                        match (ours, theirs) {
                            (0, t) => t,
                            (o, 0) => o,
                            (o, t) => o.min(t),
                        }
                    } else {
                        ours.min(theirs)
                    };
                    p.values = vec![result.to_string()];
                    if was_offered.is_none() {
                        Self::text_add(key, &result.to_string(), &mut out);
                    }
                },
                ParamType::BinaryOr | ParamType::BinaryAnd => {
                    let theirs = parse_bool(key, value)?;
                    let ours_txt = match (&was_offered, p.values.first()) {
                        (Some(o), _) | (None, Some(o)) => o.as_str(),
                        (None, None) => p.dflt.as_str(),
                    };
                    let ours = parse_bool(key, ours_txt)?;
                    let result = if p.ty == ParamType::BinaryOr {
                        ours || theirs
                    } else {
                        ours && theirs
                    };
                    let txt = YesNo::from(result).to_string();
                    p.values = vec![txt.clone()];
                    if was_offered.is_none() {
                        Self::text_add(key, &txt, &mut out);
                    }
                },
                ParamType::List => match was_offered {
                    Some(offer) => {
                        ensure!(
                            offer.split(',').any(|o| o == value),
                            "{key}: answer {value:?} is not among our offers {offer:?}"
                        );
                        p.values = vec![value.to_string()];
                    },
                    None => {
                        let theirs: Vec<&str> = value.split(',').collect();
                        let chosen = p
                            .valid
                            .split(',')
                            .find(|ours| theirs.contains(ours))
                            .map(str::to_string);
                        match chosen {
                            Some(c) => {
                                Self::text_add(key, &c, &mut out);
                                p.values = vec![c];
                            },
                            None => Self::text_add(key, "Reject", &mut out),
                        }
                    },
                },
            }

            match key {
                "AuthMethod" if self.value("AuthMethod") == Some("CHAP") => {
                    ensure!(
                        creds.auth_type == AuthType::Chap,
                        "target selected CHAP but no CHAP credentials are configured"
                    );
                    if let Some(a) = self.find_mut("CHAP_A") {
                        a.offer = Some(CHAP_ALGORITHM_MD5.to_string());
                    }
                    Self::text_add("CHAP_A", CHAP_ALGORITHM_MD5, &mut out);
                },
                "CHAP_I" => chap_id = Some(parse_chap_id(value)?),
                "CHAP_C" => chap_challenge = Some(parse_chap_challenge(value)?),
                _ => {},
            }
        }

        match (chap_id, chap_challenge) {
            (Some(id), Some(challenge)) => {
                ensure!(
                    creds.auth_type == AuthType::Chap,
                    "CHAP challenge received without CHAP credentials"
                );
                let r = calc_chap_r_hex(id, creds.secret.as_bytes(), &challenge);
                Self::text_add("CHAP_N", &creds.username, &mut out);
                Self::text_add("CHAP_R", &r, &mut out);
            },
            (None, None) => {},
            _ => bail!("CHAP_I and CHAP_C must arrive together"),
        }

        Ok(out)
    }

    fn record_offer(&mut self, key: &str, value: &str) -> Result<()> {
        let p = self
            .find_mut(key)
            .with_context(|| format!("offering unknown key {key}"))?;
        match p.ty {
            ParamType::Declarative | ParamType::DeclareMulti => {
                p.values = vec![value.to_string()];
            },
            _ => p.offer = Some(value.to_string()),
        }
        Ok(())
    }
}

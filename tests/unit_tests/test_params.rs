// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use iscsi_initiator_rs::{
    cfg::enums::SessionType,
    params::{
        AuthType, Credentials, ParamList, chap::calc_chap_r_hex, chap::parse_chap_challenge,
        params_out,
    },
};

fn pairs(text: &[u8]) -> Vec<(String, String)> {
    text.split(|b| *b == 0)
        .filter(|kv| !kv.is_empty())
        .filter_map(|kv| {
            let s = String::from_utf8_lossy(kv);
            s.split_once('=').map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect()
}

fn kv(k: &str, v: &str) -> (String, String) {
    (k.to_string(), v.to_string())
}

fn chap_creds() -> Credentials {
    Credentials {
        auth_type: AuthType::Chap,
        username: "user".into(),
        secret: "verysecretpassword".into(),
        mutual_auth: false,
    }
}

#[test]
fn test_security_offer_normal() -> Result<()> {
    let mut list = ParamList::default_initiator_list("iqn.2025-01.test:init", "box");
    let text = params_out(
        &mut list,
        &Credentials::default(),
        Some(SessionType::Normal),
        "iqn.2004-01.com.example:disk0",
        true,
    )?;
    assert_eq!(
        pairs(&text),
        vec![
            kv("InitiatorName", "iqn.2025-01.test:init"),
            kv("InitiatorAlias", "box"),
            kv("AuthMethod", "None"),
            kv("SessionType", "Normal"),
            kv("TargetName", "iqn.2004-01.com.example:disk0"),
        ]
    );
    Ok(())
}

#[test]
fn test_security_offer_discovery_with_chap() -> Result<()> {
    let mut list = ParamList::default_initiator_list("iqn.2025-01.test:init", "");
    let text = params_out(&mut list, &chap_creds(), Some(SessionType::Discovery), "", true)?;
    let offer = pairs(&text);
    assert!(offer.contains(&kv("AuthMethod", "CHAP,None")));
    assert!(offer.contains(&kv("SessionType", "Discovery")));
    assert!(!offer.iter().any(|(k, _)| k == "TargetName" || k == "InitiatorAlias"));
    Ok(())
}

#[test]
fn test_operational_offer_and_numeric_answers() -> Result<()> {
    let creds = Credentials::default();
    let mut list = ParamList::default_initiator_list("iqn.2025-01.test:init", "");
    let text = params_out(&mut list, &creds, None, "", false)?;
    let offer = pairs(&text);
    assert!(offer.contains(&kv("MaxBurstLength", "262144")));
    assert!(offer.contains(&kv("DataPDUInOrder", "No")));
    assert!(!offer.iter().any(|(k, _)| k == "SessionType"));

    let answer = b"MaxBurstLength=131072\0FirstBurstLength=0\0InitialR2T=No\0ImmediateData=No\0";
    let out = list.parse(&creds, answer, false)?;
    assert!(out.is_empty(), "answers to offers need no reply");
    assert_eq!(list.num_value("MaxBurstLength")?, 131_072);
    // NumericalZ: zero on one side defers to the other
    assert_eq!(list.num_value("FirstBurstLength")?, 65_536);
    // BinaryOr keeps our Yes, BinaryAnd follows their No
    assert!(list.bool_value("InitialR2T")?);
    assert!(!list.bool_value("ImmediateData")?);
    Ok(())
}

#[test]
fn test_initial_r2t_no_needs_both_sides() -> Result<()> {
    let creds = Credentials::default();
    let mut list = ParamList::default_initiator_list("iqn.2025-01.test:init", "");
    list.set("InitialR2T", "No")?;
    let offer = pairs(&params_out(&mut list, &creds, None, "", false)?);
    assert!(offer.contains(&kv("InitialR2T", "No")));

    let mut agreed = list.clone();
    agreed.parse(&creds, b"InitialR2T=No\0", false)?;
    assert!(!agreed.bool_value("InitialR2T")?);

    list.parse(&creds, b"InitialR2T=Yes\0", false)?;
    assert!(list.bool_value("InitialR2T")?);
    Ok(())
}

#[test]
fn test_unsolicited_keys_are_answered() -> Result<()> {
    let creds = Credentials::default();
    let mut list = ParamList::default_initiator_list("iqn.2025-01.test:init", "");
    let out = list.parse(
        &creds,
        b"MaxRecvDataSegmentLength=4096\0X-vendor-key=1\0HeaderDigest=CRC32C,None\0",
        false,
    )?;
    assert_eq!(
        pairs(&out),
        vec![
            kv("MaxRecvDataSegmentLength", "4096"),
            kv("X-vendor-key", "NotUnderstood"),
            kv("HeaderDigest", "None"),
        ]
    );
    assert_eq!(list.value("HeaderDigest"), Some("None"));
    Ok(())
}

#[test]
fn test_list_answer_outside_offer_is_refused() -> Result<()> {
    let creds = Credentials::default();
    let mut list = ParamList::default_initiator_list("iqn.2025-01.test:init", "");
    params_out(&mut list, &creds, Some(SessionType::Normal), "iqn.x", true)?;
    assert!(list.parse(&creds, b"AuthMethod=SRP\0", false).is_err());
    Ok(())
}

#[test]
fn test_malformed_text_is_refused() {
    let creds = Credentials::default();
    let mut list = ParamList::default_initiator_list("", "");
    assert!(list.parse(&creds, b"novalue\0", false).is_err());
    assert!(list.parse(&creds, b"=x\0", false).is_err());
}

#[test]
fn test_multi_valued_keys_accumulate_and_reset() -> Result<()> {
    let creds = Credentials::default();
    let mut list = ParamList::default_initiator_list("", "");
    list.parse(
        &creds,
        b"TargetName=iqn.a\0TargetAddress=10.0.0.1,1\0TargetName=iqn.b\0TargetAddress=10.0.0.2,1\0",
        false,
    )?;
    assert_eq!(list.values("TargetName"), ["iqn.a", "iqn.b"]);
    assert_eq!(list.value_at("TargetAddress", 1), Some("10.0.0.2,1"));

    list.reset("TargetName");
    assert!(list.values("TargetName").is_empty());
    Ok(())
}

#[test]
fn test_chap_challenge_is_answered() -> Result<()> {
    let creds = chap_creds();
    let mut list = ParamList::default_initiator_list("iqn.2025-01.test:init", "");
    params_out(&mut list, &creds, Some(SessionType::Normal), "iqn.x", true)?;

    let out = list.parse(&creds, b"AuthMethod=CHAP\0", false)?;
    assert_eq!(pairs(&out), vec![kv("CHAP_A", "5")]);
    list.parse(&creds, &out, true)?;

    let out = list.parse(&creds, b"CHAP_A=5\0CHAP_I=1\0CHAP_C=0x0a0b0c0d\0", false)?;
    let expected_r = calc_chap_r_hex(1, b"verysecretpassword", &[0x0a, 0x0b, 0x0c, 0x0d]);
    assert_eq!(
        pairs(&out),
        vec![
            kv("CHAP_N", "user"),
            kv("CHAP_R", &expected_r),
        ]
    );
    Ok(())
}

#[test]
fn test_chap_without_credentials_fails() -> Result<()> {
    let creds = Credentials::default();
    let mut list = ParamList::default_initiator_list("", "");
    // CHAP picked while no credentials are configured.
    assert!(list.parse(&creds, b"AuthMethod=CHAP\0", false).is_err());
    Ok(())
}

#[test]
fn test_chap_response_vector() -> Result<()> {
    // MD5(0x00 || "" || "") = 93b885adfe0da089cdf634904fd59f71
    assert_eq!(calc_chap_r_hex(0, b"", b""), "0x93B885ADFE0DA089CDF634904FD59F71");
    assert_eq!(parse_chap_challenge("0XDEAD")?, vec![0xde, 0xad]);
    assert!(parse_chap_challenge("0xabc").is_err());
    assert!(parse_chap_challenge("").is_err());
    Ok(())
}

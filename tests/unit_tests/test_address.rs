// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use iscsi_initiator_rs::{
    error::TargetAddressError, initiator::parse_target_address, models::common::ISCSI_PORT,
};

#[test]
fn test_address_without_port_uses_well_known_port() {
    assert_eq!(
        parse_target_address("10.0.0.5,1"),
        Ok(("10.0.0.5".to_string(), ISCSI_PORT))
    );
    assert_eq!(ISCSI_PORT, 3260);
}

#[test]
fn test_address_with_port() {
    assert_eq!(
        parse_target_address("192.168.1.20:3261,2"),
        Ok(("192.168.1.20".to_string(), 3261))
    );
    assert_eq!(
        parse_target_address("storage.example.com:860,1"),
        Ok(("storage.example.com".to_string(), 860))
    );
}

#[test]
fn test_address_errors() {
    assert_eq!(
        parse_target_address("10.0.0.5"),
        Err(TargetAddressError::MissingComma("10.0.0.5".to_string()))
    );
    assert_eq!(parse_target_address(""), Err(TargetAddressError::Empty));
    assert_eq!(parse_target_address(",1"), Err(TargetAddressError::Empty));
    assert_eq!(
        parse_target_address("10.0.0.5:99999,1"),
        Err(TargetAddressError::BadPort("10.0.0.5:99999,1".to_string()))
    );
    assert_eq!(
        parse_target_address("[fe80::1,1"),
        Err(TargetAddressError::BadPort("[fe80::1,1".to_string()))
    );
}

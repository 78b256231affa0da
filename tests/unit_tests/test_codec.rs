// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use hex_literal::hex;
use iscsi_initiator_rs::models::{
    common::{HEADER_LEN, NO_TAG},
    data_format::PduWithData,
    login::common::Stage,
    logout::{common::LogoutReason, request::LogoutRequestBuilder},
    nop::request::{NopOutRequest, NopOutRequestBuilder},
    opcode::Opcode,
    parse::{InboundPdu, OutboundPdu},
};

#[test]
fn test_nop_out_ping_encoding() -> Result<()> {
    let b = NopOutRequestBuilder::new()
        .immediate()
        .lun(0)
        .initiator_task_tag(0x00ab_c123)
        .target_transfer_tag(NO_TAG)
        .cmd_sn(5)
        .exp_stat_sn(0x65);
    let mut pdu = PduWithData::<NopOutRequest>::from_header(&b.header)?;
    pdu.append_data(b"ping")?;
    let (hdr, body) = pdu.build(8192)?;

    let expected = hex!(
        "40800000 00000004 00000000 00000000"
        "00abc123 ffffffff 00000005 00000065"
        "00000000 00000000 00000000 00000000"
    );
    assert_eq!(hdr, expected);
    assert_eq!(body, b"ping");
    Ok(())
}

#[test]
fn test_data_segment_is_padded() -> Result<()> {
    let b = NopOutRequestBuilder::new().initiator_task_tag(1);
    let mut pdu = PduWithData::<NopOutRequest>::from_header(&b.header)?;
    pdu.append_data(&[1, 2, 3, 4, 5])?;
    let (hdr, body) = pdu.build(0)?;

    // length field counts the payload only
    assert_eq!(&hdr[5..8], &[0, 0, 5]);
    assert_eq!(body, vec![1, 2, 3, 4, 5, 0, 0, 0]);
    Ok(())
}

#[test]
fn test_build_refuses_oversized_segment() -> Result<()> {
    let b = NopOutRequestBuilder::new();
    let mut pdu = PduWithData::<NopOutRequest>::from_header(&b.header)?;
    pdu.append_data(&[0u8; 600])?;
    assert!(pdu.build(512).is_err());
    Ok(())
}

#[test]
fn test_logout_request_encoding() -> Result<()> {
    let b = LogoutRequestBuilder::new(LogoutReason::CloseSession)
        .immediate(false)
        .initiator_task_tag(7)
        .connection_id(1)
        .cmd_sn(3)
        .exp_stat_sn(9);
    let mut hdr = [0u8; HEADER_LEN];
    b.header.to_bhs_bytes(&mut hdr)?;

    let expected = hex!(
        "06800000 00000000 00000000 00000000"
        "00000007 00010000 00000003 00000009"
        "00000000 00000000 00000000 00000000"
    );
    assert_eq!(hdr, expected);

    let OutboundPdu::LogoutRequest(h) = OutboundPdu::decode(&hdr)? else {
        panic!("decoded as something else");
    };
    assert_eq!(h.reason()?, LogoutReason::CloseSession);
    assert!(!h.opcode.i());
    Ok(())
}

#[test]
fn test_login_response_decoding() -> Result<()> {
    let raw = hex!(
        "23870000 00000000 40000137 00000101"
        "00abc123 00000000 00000064 00000000"
        "00000020 00000000 00000000 00000000"
    );
    let pdu = InboundPdu::decode(&raw)?;
    assert_eq!(pdu.opcode(), Opcode::LoginResp);
    assert_eq!(pdu.correlation_tag(), Some(0x00ab_c123));

    let InboundPdu::LoginResponse(h) = pdu else {
        panic!("decoded as something else");
    };
    assert!(h.flags.transit());
    assert_eq!(h.flags.csg(), Some(Stage::Operational));
    assert_eq!(h.flags.nsg(), Some(Stage::FullFeature));
    assert_eq!(h.isid, hex!("400001370000"));
    assert_eq!(h.tsih.get(), 0x0101);
    assert_eq!(h.stat_sn.get(), 100);
    assert_eq!(h.max_cmd_sn.get(), 32);
    assert!(h.status().is_success());
    Ok(())
}

#[test]
fn test_reject_and_async_have_no_correlation_tag() -> Result<()> {
    let mut reject = [0u8; HEADER_LEN];
    reject[0] = 0x3f;
    reject[1] = 0x80;
    reject[16..20].copy_from_slice(&0x1234u32.to_be_bytes());
    assert_eq!(InboundPdu::decode(&reject)?.correlation_tag(), None);

    let mut nop_in = [0u8; HEADER_LEN];
    nop_in[0] = 0x20;
    nop_in[1] = 0x80;
    nop_in[16..20].copy_from_slice(&NO_TAG.to_be_bytes());
    assert_eq!(InboundPdu::decode(&nop_in)?.correlation_tag(), None);
    Ok(())
}

#[test]
fn test_initiator_opcode_from_target_is_refused() {
    let mut raw = [0u8; HEADER_LEN];
    raw[0] = 0x01; // SCSI Command
    assert!(InboundPdu::decode(&raw).is_err());
    raw[0] = 0x2c; // unassigned
    assert!(InboundPdu::decode(&raw).is_err());
}

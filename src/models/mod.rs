//! Wire models: one zero-copy header type per iSCSI opcode.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Shared header trait, constants and helpers. Must stay first: the
/// `enum_dispatch` trait is registered here.
pub mod common;
/// Asynchronous Message PDU.
pub mod async_msg;
/// SCSI Command / SCSI Response PDUs.
pub mod command;
/// Data-In / Data-Out PDUs.
pub mod data;
/// Owned header-plus-data container.
pub mod data_format;
/// Login PDUs.
pub mod login;
/// Logout PDUs.
pub mod logout;
/// NOP-In / NOP-Out PDUs.
pub mod nop;
/// First BHS octet and op-code table.
pub mod opcode;
/// Typed decode of received headers.
pub mod parse;
/// Ready To Transfer PDU.
pub mod ready_2_transfer;
/// Reject PDU.
pub mod reject;
/// Text PDUs.
pub mod text;

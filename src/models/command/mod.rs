//! SCSI Command and SCSI Response PDUs.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Flags, task attributes and SCSI status codes shared by both directions.
pub mod common;
/// SCSI Command header and builder.
pub mod request;
/// SCSI Response header.
pub mod response;
/// Fixed-format sense data carried by a non-GOOD SCSI Response.
pub mod sense;

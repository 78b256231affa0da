//! SCSI Data-In and Data-Out PDUs.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Flag bytes for both data directions.
pub mod common;
/// Data-Out header and builder.
pub mod request;
/// Data-In header.
pub mod response;

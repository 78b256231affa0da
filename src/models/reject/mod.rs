//! Reject PDU.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Reject reason codes.
pub mod reject_description;
/// Reject header.
pub mod response;

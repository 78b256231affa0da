//! Logout request and response PDUs.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Reason and response codes.
pub mod common;
/// Logout request header and builder.
pub mod request;
/// Logout response header.
pub mod response;

//! Login request and response PDUs.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Login flag byte and stage encoding.
pub mod common;
/// Login request header and builder.
pub mod request;
/// Login response header.
pub mod response;
/// Status-Class / Status-Detail of a login response.
pub mod status;

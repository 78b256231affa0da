//! Text request and response PDUs.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// F/C flag byte shared by both directions.
pub mod common;
/// Text request header and builder.
pub mod request;
/// Text response header.
pub mod response;

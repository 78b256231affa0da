//! NOP-Out (initiator ping / ping reply) and NOP-In (target ping / reply).

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// NOP-Out header and builder.
pub mod request;
/// NOP-In header.
pub mod response;

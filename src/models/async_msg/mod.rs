//! Asynchronous Message PDU.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Async message header and event codes.
pub mod response;

//! The initiator context: target table, session lifecycle, the enqueue
//! dispatcher and the login / discovery / logout conversations it drives.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// `InitiatorContext` and the public submission API.
pub mod context;
/// SendTargets discovery and the `TargetAddress` grammar.
pub mod discovery;
/// The task that sets sessions up for queued commands.
pub mod dispatcher;
/// Multi-round Login conversation.
pub mod login;
/// Session close.
pub mod logout;

pub use context::{InitiatorContext, Target, TargetInfo};
pub use discovery::{Discovered, parse_target_address};

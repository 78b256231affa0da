//! Per-session machinery: the command record, tag table, Tx / Rx workers
//! and the session pool.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Commands and their per-kind arguments.
pub mod command;
/// Socket helpers shared by the workers.
pub mod common;
/// PDU framing over a TCP stream.
pub mod connection;
/// Commands on the wire awaiting resolution.
pub mod outstanding;
/// Reusable session records.
pub mod pool_sessions;
/// Receive worker and the response handlers.
pub mod rx_worker;
/// Session state, sequence numbers and teardown.
pub mod session;
/// Initiator Task Tag allocation and lookup.
pub mod tag_table;
/// Transmit worker.
pub mod tx_worker;

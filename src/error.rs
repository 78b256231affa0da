// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

/// Errors returned synchronously from the public initiator API.
#[derive(Debug, Error)]
pub enum InitiatorError {
    /// socket create / connect / send / recv failure
    #[error("transport error: {0}")]
    Transport(String),
    /// sequence-number mismatch, bad tag, bad status class, ...
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("queue is full")]
    QueueFull,
    #[error("session pool exhausted")]
    PoolExhausted,
    #[error("tag 0x{0:08x} is already in flight")]
    DuplicateTag(u32),
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("target {0} has no session")]
    NoSession(usize),
    #[error("initiator is shutting down")]
    Shutdown,
    #[error("command failed with status {0}")]
    CommandFailed(i32),
}

/// Failure to parse a `TargetAddress` value of the form
/// `ip[:port],portal-group-tag`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetAddressError {
    #[error("TargetAddress is empty")]
    Empty,
    #[error("TargetAddress {0:?} has no portal group tag")]
    MissingComma(String),
    #[error("TargetAddress {0:?} has an invalid port")]
    BadPort(String),
}

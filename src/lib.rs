//! This crate provides an asynchronous iSCSI initiator: sessions, the
//! command engine that drives them and the PDU codec underneath.
// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Handles configuration, command-line path resolution, and logging.
pub mod cfg;
/// Sessions, their Tx / Rx workers, commands and the tag table.
pub mod client;
/// Typed errors returned by the public API.
pub mod error;
/// The initiator context, its dispatcher and the login phases.
pub mod initiator;
/// Defines the data structures for iSCSI PDUs and SCSI commands.
pub mod models;
/// Text key negotiation and CHAP.
pub mod params;
/// Scatter/gather buffers and burst windowing.
pub mod sg;
/// Provides utility functions used throughout the crate.
pub mod utils;

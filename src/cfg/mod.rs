//! Configuration loading, path resolution and logger setup.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Config path resolution.
pub mod cli;
/// YAML configuration schema.
pub mod config;
/// Enumerations used in configuration.
pub mod enums;
/// JSON `tracing` subscriber setup.
pub mod logger;

// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Stanchion is an editor-side scheduling engine for PHPStan.
//!
//! It tracks open PHP buffers, debounces and serializes analyzer runs,
//! snapshots unsaved edits to temp files, and publishes inline
//! diagnostics with tight column ranges. Editors talk to it over a
//! newline-delimited JSON protocol on a Unix socket.

/// Layered configuration and settings-change invalidation.
pub mod config;
/// Scheduling, buffer tracking, exclusion, and diagnostic rendering.
pub mod engine;
/// Unix socket server for editor events.
pub mod ipc;
/// PHPStan binary discovery, process invocation, and output parsing.
pub mod phpstan;
/// The editor-facing output abstraction.
pub mod surface;

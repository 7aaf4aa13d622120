// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Seam between the scheduling engine and the hosting editor.
//!
//! The engine never talks to an editor directly. Everything user-visible
//! goes through [`EditorSurface`]: the merged diagnostic view (replaced
//! wholesale on every reconciliation pass), one-shot notices for tool and
//! environment failures, and the busy indicator. The daemon implements
//! the trait as JSON lines on stdout; tests implement recording doubles.

use lsp_types::Diagnostic;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Severity of a one-shot user-facing notice.
///
/// Notices are transient notifications (banners, status-bar toasts), not
/// editor diagnostics. Tool-level output and environment failures are
/// surfaced this way so they never clobber per-line findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeSeverity {
    /// Fatal tool or environment failure.
    Error,
    /// Recoverable tool warning.
    Warning,
}

/// The full per-file diagnostic view, keyed by absolute path.
///
/// An entry with an empty `Vec` clears that file's diagnostics.
pub type DiagnosticMap = BTreeMap<PathBuf, Vec<Diagnostic>>;

/// Everything the engine can show to the user.
pub trait EditorSurface: Send + Sync {
    /// Replaces the entire diagnostic surface with `diagnostics`.
    ///
    /// Publishing the same map twice must produce the same visible state.
    fn publish(&self, diagnostics: DiagnosticMap);

    /// Shows a one-shot notification.
    fn notify(&self, severity: NoticeSeverity, message: &str);

    /// Updates the busy indicator (analysis queued or running).
    fn set_busy(&self, busy: bool);
}

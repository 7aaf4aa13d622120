// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Parses phpstan's raw-format stdout into typed findings.
//!
//! In raw mode the tool emits one issue per line as
//! `<absolutePath>:<lineNumber>:<message>`. Anything else on stdout is
//! either internal noise (lines opened by the marker character) or
//! tool-level messages (`Warning:` / `Fatal error:` prefixes), which are
//! surfaced as one-shot notices rather than editor diagnostics.
//! Malformed lines are dropped, never propagated.

use crate::surface::NoticeSeverity;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Tag prepended to every finding message.
pub const TOOL_TAG: &str = "[phpstan]";

/// Character opening phpstan's internal progress/debug lines in raw mode.
const MARKER: char = '#';

/// Substring identifying the "file not autoloaded" noise case. One
/// unresolved root cause fans out into this message once per symbol, so
/// it is collapsed to a single synthetic finding per run.
const AUTOLOAD_NOISE: &str = "not found while trying to analyse it";

/// Synthetic message replacing the autoload noise.
const AUTOLOAD_SYNTHETIC: &str =
    "some symbols could not be resolved. The file is probably not autoloaded correctly.";

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A reported issue (the default for line-anchored findings).
    Error,
    /// A non-fatal issue.
    Warning,
    /// Informational, e.g. the queued placeholder.
    Info,
}

/// One analyzer-reported issue, anchored to a file and line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Absolute path of the file the finding belongs to (identity key).
    pub file: PathBuf,
    /// 1-based line number; a reported 0 is normalized to 1.
    pub line: u32,
    /// Message text, prefixed with [`TOOL_TAG`].
    pub message: String,
    /// Severity; defaults to error for line-anchored findings.
    pub severity: Severity,
}

/// Parses a findings-shaped stdout (exit code [`super::EXIT_FINDINGS`]).
///
/// `analyzed_path` is the path that was actually passed to the analyzer
/// (the on-disk file or a temp snapshot) and is stripped from each line;
/// `file_key` is the document the findings attach to. The two differ
/// when an unsaved buffer was analyzed through a snapshot.
#[must_use]
pub fn parse_findings(stdout: &str, analyzed_path: &Path, file_key: &Path) -> Vec<Finding> {
    let prefix = format!("{}:", analyzed_path.display());
    let mut findings = Vec::new();
    let mut autoload_seen = false;

    for raw_line in stdout.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with(MARKER) {
            continue;
        }

        let rest = line.strip_prefix(&prefix).unwrap_or(line);

        let mut fields = rest.splitn(2, ':');
        let Some(line_field) = fields.next() else {
            continue;
        };
        let Ok(line_number) = line_field.trim().parse::<u32>() else {
            debug!("Dropping unparsable analyzer line: {line}");
            continue;
        };
        let message = fields.next().unwrap_or("").trim();

        if message.contains(AUTOLOAD_NOISE) {
            if !autoload_seen {
                autoload_seen = true;
                findings.push(Finding {
                    file: file_key.to_path_buf(),
                    line: 1,
                    message: format!("{TOOL_TAG} {AUTOLOAD_SYNTHETIC}"),
                    severity: Severity::Error,
                });
            }
            continue;
        }

        findings.push(Finding {
            file: file_key.to_path_buf(),
            line: line_number.max(1),
            message: format!("{TOOL_TAG} {message}"),
            severity: Severity::Error,
        });
    }

    findings
}

/// Extracts tool-level messages from a non-findings stdout.
///
/// Recognizes `Warning:` and `Fatal error:` prefixed lines. Returns an
/// empty vector when stdout carries neither shape, in which case the
/// scheduler decides between "clean run" (empty stdout) and
/// "unrecognized output" (anything else).
#[must_use]
pub fn parse_tool_output(stdout: &str) -> Vec<(NoticeSeverity, String)> {
    let mut notices = Vec::new();
    for raw_line in stdout.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with(MARKER) {
            continue;
        }
        if line.starts_with("Warning:") {
            notices.push((NoticeSeverity::Warning, format!("{TOOL_TAG} {line}")));
        } else if line.starts_with("Fatal error:") || line.starts_with("Error:") {
            notices.push((NoticeSeverity::Error, format!("{TOOL_TAG} {line}")));
        }
    }
    notices
}

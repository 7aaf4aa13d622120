// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Converts the merged finding list into per-file diagnostic batches.
//!
//! Findings only carry a line number. For files that are open in the
//! editor, the reported line's text is trimmed on both ends to compute a
//! tight column range; for files that are not open (analyzed earlier but
//! no longer visible) the range falls back to the first character. The
//! output is a pure function of its inputs, so republishing the same
//! findings yields the same visible state.

use crate::engine::documents::DocumentStore;
use crate::phpstan::parser::{Finding, Severity};
use crate::surface::DiagnosticMap;
use lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};

/// Diagnostic source label shown next to each message.
const SOURCE: &str = "phpstan";

/// Builds the per-file diagnostic view from all merged findings.
#[must_use]
pub fn render(findings: &[Finding], documents: &DocumentStore) -> DiagnosticMap {
    let mut map = DiagnosticMap::new();
    for finding in findings {
        let line = finding.line.saturating_sub(1);
        let (start, end) = documents
            .line(&finding.file, line as usize)
            .map_or((0, 1), line_span);

        let diagnostic = Diagnostic {
            range: Range {
                start: Position {
                    line,
                    character: start,
                },
                end: Position {
                    line,
                    character: end,
                },
            },
            severity: Some(map_severity(finding.severity)),
            source: Some(SOURCE.to_string()),
            message: finding.message.clone(),
            ..Diagnostic::default()
        };

        map.entry(finding.file.clone()).or_default().push(diagnostic);
    }
    map
}

/// Computes the column range covering a line's non-whitespace content.
fn line_span(text: &str) -> (u32, u32) {
    let leading = text.chars().take_while(|c| c.is_whitespace()).count();
    let trimmed_len = text.trim_end().chars().count();
    if trimmed_len <= leading {
        // Blank line — the reported line has no content to anchor to
        return (0, 1);
    }
    (clamp_u32(leading), clamp_u32(trimmed_len))
}

fn clamp_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

const fn map_severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Info => DiagnosticSeverity::INFORMATION,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn finding(file: &str, line: u32, message: &str) -> Finding {
        Finding {
            file: PathBuf::from(file),
            line,
            message: message.to_string(),
            severity: Severity::Error,
        }
    }

    #[test]
    fn tight_range_from_open_document() {
        let mut documents = DocumentStore::new();
        documents.opened(
            Path::new("/tmp/x.php"),
            "<?php\n    $a = 1;   \n".to_string(),
        );

        let map = render(&[finding("/tmp/x.php", 2, "[phpstan] oops")], &documents);
        let diags = map.get(Path::new("/tmp/x.php")).unwrap();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].range.start.line, 1);
        assert_eq!(diags[0].range.start.character, 4);
        assert_eq!(diags[0].range.end.character, 11);
        assert_eq!(diags[0].severity, Some(DiagnosticSeverity::ERROR));
        assert_eq!(diags[0].source.as_deref(), Some("phpstan"));
    }

    #[test]
    fn fallback_range_for_closed_document() {
        let documents = DocumentStore::new();
        let map = render(&[finding("/tmp/x.php", 5, "[phpstan] oops")], &documents);
        let diags = map.get(Path::new("/tmp/x.php")).unwrap();
        assert_eq!(diags[0].range.start.line, 4);
        assert_eq!(diags[0].range.start.character, 0);
        assert_eq!(diags[0].range.end.character, 1);
    }

    #[test]
    fn fallback_range_for_out_of_range_line() {
        let mut documents = DocumentStore::new();
        documents.opened(Path::new("/tmp/x.php"), "<?php\n".to_string());

        let map = render(&[finding("/tmp/x.php", 100, "[phpstan] oops")], &documents);
        let diags = map.get(Path::new("/tmp/x.php")).unwrap();
        assert_eq!(diags[0].range.start.character, 0);
        assert_eq!(diags[0].range.end.character, 1);
    }

    #[test]
    fn findings_grouped_per_file() {
        let documents = DocumentStore::new();
        let map = render(
            &[
                finding("/tmp/a.php", 1, "[phpstan] a1"),
                finding("/tmp/b.php", 2, "[phpstan] b1"),
                finding("/tmp/a.php", 3, "[phpstan] a2"),
            ],
            &documents,
        );
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(Path::new("/tmp/a.php")).unwrap().len(), 2);
        assert_eq!(map.get(Path::new("/tmp/b.php")).unwrap().len(), 1);
    }

    #[test]
    fn idempotent() {
        let mut documents = DocumentStore::new();
        documents.opened(Path::new("/tmp/x.php"), "  $x;  \n".to_string());
        let findings = vec![finding("/tmp/x.php", 1, "[phpstan] oops")];

        let first = render(&findings, &documents);
        let second = render(&findings, &documents);
        assert_eq!(first, second);
    }

    #[test]
    fn info_severity_mapped() {
        let documents = DocumentStore::new();
        let mut queued = finding("/tmp/x.php", 1, "[phpstan] queued");
        queued.severity = Severity::Info;

        let map = render(&[queued], &documents);
        let diags = map.get(Path::new("/tmp/x.php")).unwrap();
        assert_eq!(diags[0].severity, Some(DiagnosticSeverity::INFORMATION));
    }
}

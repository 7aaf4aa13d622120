// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

/// Filesystem probe for the phpstan executable.
pub mod binary;
/// Raw-format output parsing into typed findings.
pub mod parser;
/// Analyzer process invocation and the exit-code contract.
pub mod process;

pub use parser::{Finding, Severity};
pub use process::{AnalyzerCommand, EXIT_FINDINGS, RunOutput, RunResult, SpawnError};

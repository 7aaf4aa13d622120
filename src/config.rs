/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Analyzer settings as an immutable snapshot.
//!
//! Settings are never mutated in place. A change produces a fresh
//! [`Settings`] value, and the pure [`invalidation`] diff decides what
//! the change means for cached analysis results. This keeps the
//! invalidation policy in one function instead of scattered across
//! per-field setters.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Default debounce window between a trigger event and the analyzer run.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// One immutable snapshot of the analyzer settings.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Whether analysis runs at all (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Explicit path to the phpstan executable. `None` means discover it
    /// from the workspace, the Composer home, and `PATH`.
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Rule level passed as `--level=<level>` (default: "max").
    #[serde(default = "default_level")]
    pub level: String,

    /// Memory limit passed as `--memory-limit=<limit>` (default: "1G").
    #[serde(default = "default_memory_limit")]
    pub memory_limit: String,

    /// Extra CLI options appended before the target path.
    #[serde(default)]
    pub options: Vec<String>,

    /// Explicit project configuration passed as `-c <path>`. When unset,
    /// the workspace root is probed for `phpstan.neon`, then
    /// `phpstan.neon.dist`.
    #[serde(default)]
    pub project_file: Option<PathBuf>,

    /// Autoload script passed as `--autoload-file=<path>`.
    #[serde(default)]
    pub autoload_file: Option<PathBuf>,

    /// Exclude globs, resolved relative to each workspace root.
    #[serde(default)]
    pub excludes: Vec<String>,

    /// Debounce window in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_level() -> String {
    "max".to_string()
}

fn default_memory_limit() -> String {
    "1G".to_string()
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            binary_path: None,
            level: default_level(),
            memory_limit: default_memory_limit(),
            options: Vec::new(),
            project_file: None,
            autoload_file: None,
            excludes: Vec::new(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Settings {
    /// Load settings from standard paths or a specific file.
    ///
    /// Sources, later ones overriding earlier:
    /// 1. Built-in defaults.
    /// 2. `~/.config/stanchion/config.toml` (user config directory).
    /// 3. The explicit file, if provided.
    /// 4. `STANCHION_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a source fails to load or deserialize.
    pub fn load(explicit_file: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("stanchion").join("config.toml");
            if config_path.exists() {
                builder = builder.add_source(config::File::from(config_path));
            }
        }

        if let Some(path) = explicit_file {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(config::Environment::with_prefix("STANCHION"));

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

/// What a settings change means for cached per-file results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    /// Cached results stay valid.
    Keep,
    /// Every cached result set must be dropped and re-derived.
    ClearResults,
}

/// Diffs two settings snapshots and decides the invalidation scope.
///
/// Binary, level, options, project config, and autoload file all change
/// what a run would report, so cached results are cleared. The memory
/// limit and exclude patterns cannot change the findings of a run that
/// already completed, so results are kept.
#[must_use]
pub fn invalidation(old: &Settings, new: &Settings) -> Invalidation {
    if old.binary_path != new.binary_path
        || old.level != new.level
        || old.options != new.options
        || old.project_file != new.project_file
        || old.autoload_file != new.autoload_file
    {
        Invalidation::ClearResults
    } else {
        Invalidation::Keep
    }
}

// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Locates the phpstan executable on disk.
//!
//! Candidates are probed in order: each workspace root's Composer
//! `vendor/bin`, the global Composer home, then every directory on the
//! executable search path. The first existing, executable candidate
//! wins. The probe takes its environment as arguments so tests can
//! exercise the ordering without touching process globals.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(windows)]
const BINARY_NAME: &str = "phpstan.bat";
#[cfg(not(windows))]
const BINARY_NAME: &str = "phpstan";

/// Probes for the phpstan executable using the real process environment.
#[must_use]
pub fn discover_default(roots: &[PathBuf]) -> Option<PathBuf> {
    let composer_home = std::env::var_os("COMPOSER_HOME").map(PathBuf::from);
    let path_env = std::env::var_os("PATH");
    discover(roots, composer_home, dirs::home_dir(), path_env.as_deref())
}

/// Probes for the phpstan executable with an injected environment.
///
/// `composer_home` overrides the default Composer home
/// (`<home>/.composer`); `path_env` is the raw `PATH` value.
#[must_use]
pub fn discover(
    roots: &[PathBuf],
    composer_home: Option<PathBuf>,
    home: Option<PathBuf>,
    path_env: Option<&OsStr>,
) -> Option<PathBuf> {
    for root in roots {
        let candidate = root.join("vendor").join("bin").join(BINARY_NAME);
        if is_executable(&candidate) {
            debug!("Found phpstan in workspace: {}", candidate.display());
            return Some(candidate);
        }
    }

    let composer_home = composer_home.or_else(|| home.map(|h| h.join(".composer")));
    if let Some(composer_home) = composer_home {
        let candidate = composer_home.join("vendor").join("bin").join(BINARY_NAME);
        if is_executable(&candidate) {
            debug!("Found phpstan in Composer home: {}", candidate.display());
            return Some(candidate);
        }
    }

    if let Some(path_env) = path_env {
        for dir in std::env::split_paths(path_env) {
            let candidate = dir.join(BINARY_NAME);
            if is_executable(&candidate) {
                debug!("Found phpstan on PATH: {}", candidate.display());
                return Some(candidate);
            }
        }
    }

    debug!("No phpstan executable found");
    None
}

/// Returns true if the path exists and carries an executable bit.
#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn make_executable(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(BINARY_NAME);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn workspace_vendor_bin_wins() {
        let root = tempfile::tempdir().unwrap();
        let composer = tempfile::tempdir().unwrap();
        let expected = make_executable(&root.path().join("vendor").join("bin"));
        make_executable(&composer.path().join("vendor").join("bin"));

        let found = discover(
            &[root.path().to_path_buf()],
            Some(composer.path().to_path_buf()),
            None,
            None,
        );
        assert_eq!(found, Some(expected));
    }

    #[cfg(unix)]
    #[test]
    fn composer_home_before_path() {
        let root = tempfile::tempdir().unwrap();
        let composer = tempfile::tempdir().unwrap();
        let path_dir = tempfile::tempdir().unwrap();
        let expected = make_executable(&composer.path().join("vendor").join("bin"));
        make_executable(path_dir.path());

        let found = discover(
            &[root.path().to_path_buf()],
            Some(composer.path().to_path_buf()),
            None,
            Some(path_dir.path().as_os_str()),
        );
        assert_eq!(found, Some(expected));
    }

    #[cfg(unix)]
    #[test]
    fn falls_back_to_path() {
        let path_dir = tempfile::tempdir().unwrap();
        let expected = make_executable(path_dir.path());

        let found = discover(&[], None, None, Some(path_dir.path().as_os_str()));
        assert_eq!(found, Some(expected));
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_candidate_skipped() {
        let path_dir = tempfile::tempdir().unwrap();
        std::fs::write(path_dir.path().join(BINARY_NAME), "not a script").unwrap();

        let found = discover(&[], None, None, Some(path_dir.path().as_os_str()));
        assert_eq!(found, None);
    }

    #[test]
    fn nothing_found_in_empty_environment() {
        let found = discover(&[], None, None, None);
        assert_eq!(found, None);
    }
}

// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Glob-based exclusion filter.
//!
//! Exclude patterns come from configuration as strings relative to the
//! owning workspace root (absolute patterns are honored as-is). Files
//! matching any pattern are skipped entirely: no run, no error. Invalid
//! patterns are logged and ignored rather than failing the whole set.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Compiled exclusion set anchored at one workspace root.
#[derive(Debug)]
pub struct ExcludeFilter {
    set: GlobSet,
}

impl ExcludeFilter {
    /// Compiles `patterns` against `root`.
    #[must_use]
    pub fn new(root: &Path, patterns: &[String]) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let anchored: PathBuf = if Path::new(pattern).is_absolute() {
                PathBuf::from(pattern)
            } else {
                root.join(pattern)
            };
            match Glob::new(&anchored.to_string_lossy()) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => {
                    warn!("Ignoring invalid exclude pattern '{pattern}': {e}");
                }
            }
        }
        let set = builder.build().unwrap_or_else(|e| {
            warn!("Failed to build exclude set: {e}");
            GlobSet::empty()
        });
        Self { set }
    }

    /// Returns true if `path` matches any exclude pattern.
    #[must_use]
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.set.is_match(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_pattern_anchored_at_root() {
        let filter = ExcludeFilter::new(Path::new("/proj"), &["vendor/**".to_string()]);
        assert!(filter.is_excluded(Path::new("/proj/vendor/lib/a.php")));
        assert!(!filter.is_excluded(Path::new("/proj/src/a.php")));
        // Same relative path under a different root is not excluded
        assert!(!filter.is_excluded(Path::new("/other/vendor/lib/a.php")));
    }

    #[test]
    fn absolute_pattern_honored() {
        let filter = ExcludeFilter::new(Path::new("/proj"), &["/tmp/cache/**".to_string()]);
        assert!(filter.is_excluded(Path::new("/tmp/cache/x.php")));
    }

    #[test]
    fn deep_wildcard() {
        let filter = ExcludeFilter::new(Path::new("/proj"), &["**/generated/**".to_string()]);
        assert!(filter.is_excluded(Path::new("/proj/src/generated/model.php")));
    }

    #[test]
    fn invalid_pattern_skipped() {
        let filter = ExcludeFilter::new(
            Path::new("/proj"),
            &["[invalid".to_string(), "vendor/**".to_string()],
        );
        // The valid pattern still applies
        assert!(filter.is_excluded(Path::new("/proj/vendor/a.php")));
    }

    #[test]
    fn empty_patterns_exclude_nothing() {
        let filter = ExcludeFilter::new(Path::new("/proj"), &[]);
        assert!(!filter.is_excluded(Path::new("/proj/src/a.php")));
    }
}

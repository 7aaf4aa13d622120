// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

/// Open-buffer tracking with dirty flags and line text access.
pub mod documents;
/// Glob-based exclusion filter.
pub mod exclude;
/// Converts merged findings into per-file diagnostic batches.
pub mod render;
/// Debounce, global run lock, snapshots, and result reconciliation.
pub mod scheduler;

pub use documents::DocumentStore;
pub use exclude::ExcludeFilter;
pub use scheduler::Scheduler;

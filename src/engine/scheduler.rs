// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! The scheduling and reconciliation engine.
//!
//! Decides when to (re-)run the analyzer and folds results back into the
//! merged diagnostic view. Per-file state (debounce timer, running
//! process, cached results) lives in one record per file so the "at most
//! one timer XOR process" invariant is co-located with the data it
//! guards. Runs are serialized project-wide through a one-permit
//! semaphore because phpstan does not support concurrent invocations
//! against the same project; waiters are woken FIFO on release.
//!
//! Unsaved buffers are analyzed through temp-file snapshots so the
//! findings reflect exactly what the user sees, not stale disk content.
//! Snapshot deletion and lock release are both RAII and run on every
//! path, including kills.

use crate::config::{self, Invalidation, Settings};
use crate::engine::documents::DocumentStore;
use crate::engine::exclude::ExcludeFilter;
use crate::engine::render;
use crate::phpstan::parser::{self, Finding, Severity, TOOL_TAG};
use crate::phpstan::process::{self, AnalyzerCommand, EXIT_FINDINGS, RunResult, SpawnError};
use crate::phpstan::binary;
use crate::surface::{EditorSurface, NoticeSeverity};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::{Mutex, Semaphore, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Conventional project configuration filenames, probed in order.
const PROJECT_CONFIG_NAMES: [&str; 2] = ["phpstan.neon", "phpstan.neon.dist"];

/// Where a file currently is in the analysis lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Debounce timer pending or waiting for the run lock.
    Queued,
    /// Analyzer process executing.
    Running,
    /// No pending work; `results` holds the last completed outcome.
    Done,
}

/// Everything tracked for one file. At most one debounce timer XOR one
/// running process exists at any instant; a newer submission supersedes
/// both by bumping `generation`.
struct FileState {
    generation: u64,
    phase: Phase,
    debounce: Option<JoinHandle<()>>,
    kill: Option<oneshot::Sender<()>>,
    /// Last completed run's findings. Preserved across tool failures so
    /// transient errors never blank the diagnostic view.
    results: Vec<Finding>,
    /// Fingerprint of the content the last completed run analyzed.
    fingerprint: Option<u64>,
}

impl FileState {
    fn new() -> Self {
        Self {
            generation: 0,
            phase: Phase::Done,
            debounce: None,
            kill: None,
            results: Vec::new(),
            fingerprint: None,
        }
    }

    /// Cancels pending work and claims a new generation.
    fn supersede(&mut self) -> u64 {
        self.generation += 1;
        if let Some(handle) = self.debounce.take() {
            handle.abort();
        }
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
        self.generation
    }
}

/// Schedules analyzer runs and reconciles their results.
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    settings: Mutex<Arc<Settings>>,
    roots: Vec<PathBuf>,
    /// Resolved analyzer path; cleared on spawn failure or binary-path
    /// change to force rediscovery.
    binary: Mutex<Option<PathBuf>>,
    /// Guards against repeating the "configured binary missing" notice
    /// on every keystroke.
    binary_error_notified: AtomicBool,
    files: Mutex<HashMap<PathBuf, FileState>>,
    documents: Arc<Mutex<DocumentStore>>,
    /// The global run lock: phpstan forbids concurrent runs against the
    /// same project, so every invocation passes through this one permit.
    run_lock: Arc<Semaphore>,
    surface: Arc<dyn EditorSurface>,
}

impl Scheduler {
    /// Creates a scheduler over the given workspace roots.
    #[must_use]
    pub fn new(settings: Settings, roots: Vec<PathBuf>, surface: Arc<dyn EditorSurface>) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings: Mutex::new(Arc::new(settings)),
                roots,
                binary: Mutex::new(None),
                binary_error_notified: AtomicBool::new(false),
                files: Mutex::new(HashMap::new()),
                documents: Arc::new(Mutex::new(DocumentStore::new())),
                run_lock: Arc::new(Semaphore::new(1)),
                surface,
            }),
        }
    }

    /// Shared handle to the open-buffer store.
    #[must_use]
    pub fn documents(&self) -> Arc<Mutex<DocumentStore>> {
        self.inner.documents.clone()
    }

    /// Requests (re-)analysis of `file`.
    ///
    /// Idempotent under rapid repeated calls: only the latest submission
    /// within the debounce window actually runs. A newer submission kills
    /// any in-flight run for the same file (but never for other files).
    pub async fn submit(&self, file: &Path) {
        let settings = self.inner.settings_snapshot().await;

        if !settings.enabled || !is_php(file) {
            self.inner.publish_busy().await;
            return;
        }

        let Some(binary) = self.inner.resolve_binary(&settings).await else {
            self.inner.publish_busy().await;
            return;
        };

        let root = self.inner.owning_root(file);

        let generation = {
            let mut files = self.inner.files.lock().await;
            let state = files
                .entry(file.to_path_buf())
                .or_insert_with(FileState::new);
            state.supersede()
        };

        let filter = ExcludeFilter::new(&root, &settings.excludes);
        if filter.is_excluded(file) {
            debug!("Skipping excluded file: {}", file.display());
            self.inner.set_phase(file, generation, Phase::Done).await;
            self.inner.publish().await;
            self.inner.publish_busy().await;
            return;
        }

        self.inner.set_phase(file, generation, Phase::Queued).await;

        let inner = self.inner.clone();
        let file_owned = file.to_path_buf();
        let debounce_ms = settings.debounce_ms;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(debounce_ms)).await;
            inner.run(file_owned, generation, settings, binary, root).await;
        });

        {
            let mut files = self.inner.files.lock().await;
            if let Some(state) = files.get_mut(file) {
                if state.generation == generation {
                    state.debounce = Some(handle);
                } else {
                    handle.abort();
                }
            }
        }

        self.inner.publish().await;
        self.inner.publish_busy().await;
    }

    /// Kills any in-flight run and pending timer for `file`.
    pub async fn cancel(&self, file: &Path) {
        {
            let mut files = self.inner.files.lock().await;
            if let Some(state) = files.get_mut(file) {
                state.supersede();
                state.phase = Phase::Done;
            }
        }
        self.inner.publish().await;
        self.inner.publish_busy().await;
    }

    /// Swaps in a new settings snapshot and applies the invalidation
    /// policy derived from the diff.
    pub async fn update_settings(&self, new: Settings) {
        let old = {
            let mut guard = self.inner.settings.lock().await;
            std::mem::replace(&mut *guard, Arc::new(new.clone()))
        };

        if config::invalidation(&old, &new) == Invalidation::ClearResults {
            debug!("Settings change invalidates cached results");
            let mut files = self.inner.files.lock().await;
            for state in files.values_mut() {
                state.results.clear();
                state.fingerprint = None;
            }
            drop(files);
            self.inner.publish().await;
        }

        if old.binary_path != new.binary_path {
            *self.inner.binary.lock().await = None;
            self.inner
                .binary_error_notified
                .store(false, Ordering::SeqCst);
        }

        if !new.enabled {
            let mut files = self.inner.files.lock().await;
            for state in files.values_mut() {
                state.supersede();
                state.phase = Phase::Done;
            }
            drop(files);
            self.inner.publish().await;
            self.inner.publish_busy().await;
        }
    }

    /// Evicts a closed document from the buffer store. Cached results
    /// are kept; the renderer falls back to a first-character range for
    /// files that are no longer open.
    pub async fn document_closed(&self, file: &Path) {
        self.inner.documents.lock().await.closed(file);
        self.inner.publish().await;
    }
}

impl Inner {
    async fn settings_snapshot(&self) -> Arc<Settings> {
        self.settings.lock().await.clone()
    }

    /// Resolves the analyzer path: explicit setting first (a missing
    /// explicit path is an environment error, reported once), otherwise
    /// the cached discovery result.
    async fn resolve_binary(&self, settings: &Settings) -> Option<PathBuf> {
        if let Some(path) = &settings.binary_path {
            if path.exists() {
                return Some(path.clone());
            }
            if !self.binary_error_notified.swap(true, Ordering::SeqCst) {
                self.surface.notify(
                    NoticeSeverity::Error,
                    &format!(
                        "Configured phpstan binary does not exist: {}",
                        path.display()
                    ),
                );
            }
            return None;
        }

        let mut cached = self.binary.lock().await;
        if cached.is_none() {
            *cached = binary::discover_default(&self.roots);
        }
        cached.clone()
    }

    /// Returns the workspace root owning `file`, else its parent dir.
    fn owning_root(&self, file: &Path) -> PathBuf {
        self.roots
            .iter()
            .find(|root| file.starts_with(root))
            .cloned()
            .unwrap_or_else(|| {
                file.parent()
                    .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
            })
    }

    async fn is_current(&self, file: &Path, generation: u64) -> bool {
        self.files
            .lock()
            .await
            .get(file)
            .is_some_and(|state| state.generation == generation)
    }

    async fn set_phase(&self, file: &Path, generation: u64, phase: Phase) {
        let mut files = self.files.lock().await;
        if let Some(state) = files.get_mut(file)
            && state.generation == generation
        {
            state.phase = phase;
        }
    }

    /// The debounced run body: snapshot, admission, spawn, reconcile.
    async fn run(
        self: Arc<Self>,
        file: PathBuf,
        generation: u64,
        settings: Arc<Settings>,
        binary: PathBuf,
        root: PathBuf,
    ) {
        if !self.is_current(&file, generation).await {
            return;
        }

        // Content the analyzer will see: the live buffer when dirty,
        // otherwise whatever is on disk.
        let buffer_text = {
            let documents = self.documents.lock().await;
            if documents.is_dirty(&file) {
                documents.text(&file).map(ToString::to_string)
            } else {
                None
            }
        };
        let content = match &buffer_text {
            Some(text) => Some(text.clone()),
            None => tokio::fs::read_to_string(&file).await.ok(),
        };
        let fingerprint = content.as_deref().map(fnv1a_hash);

        // Unchanged content with a completed result: nothing to re-derive.
        if let Some(fp) = fingerprint
            && self.matches_fingerprint(&file, generation, fp).await
        {
            debug!("Content unchanged, skipping run: {}", file.display());
            self.set_phase(&file, generation, Phase::Done).await;
            self.publish().await;
            self.publish_busy().await;
            return;
        }

        let snapshot = match buffer_text {
            Some(text) => match write_snapshot(&text) {
                Ok(tmp) => Some(tmp),
                Err(e) => {
                    warn!("Failed to snapshot unsaved buffer: {e}");
                    None
                }
            },
            None => None,
        };
        let target = snapshot
            .as_ref()
            .map_or_else(|| file.clone(), |tmp| tmp.path().to_path_buf());

        // FIFO admission: phpstan forbids concurrent runs, so every
        // invocation waits its turn here regardless of triggering file.
        let Ok(permit) = self.run_lock.clone().acquire_owned().await else {
            return;
        };

        if !self.is_current(&file, generation).await {
            return; // superseded while waiting; permit and snapshot drop
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        {
            let mut files = self.files.lock().await;
            let Some(state) = files.get_mut(&file) else {
                return;
            };
            if state.generation != generation {
                return;
            }
            state.debounce = None;
            state.kill = Some(kill_tx);
            state.phase = Phase::Running;
        }

        let command = AnalyzerCommand {
            binary,
            level: settings.level.clone(),
            autoload_file: settings.autoload_file.clone(),
            project_file: resolve_project_config(&settings, &root),
            memory_limit: settings.memory_limit.clone(),
            options: settings.options.clone(),
            target: target.clone(),
            working_dir: Some(root),
        };

        let result = process::run(&command, kill_rx).await;

        {
            let mut files = self.files.lock().await;
            if let Some(state) = files.get_mut(&file)
                && state.generation == generation
            {
                state.kill = None;
            }
        }

        // Release the lock and delete the snapshot before reconciling;
        // both must happen on every path, including errors and kills.
        drop(permit);
        drop(snapshot);

        match result {
            Err(error) => {
                if matches!(error, SpawnError::NotFound(_)) {
                    // Force rediscovery on the next submission
                    *self.binary.lock().await = None;
                }
                self.surface
                    .notify(NoticeSeverity::Error, &error.to_string());
                self.finish_without_update(&file, generation).await;
            }
            Ok(RunResult::Killed) => {
                // Superseded or cancelled; the newer submission owns the
                // state now. Only the busy indicator may need refreshing.
                self.publish_busy().await;
            }
            Ok(RunResult::Completed(output)) => {
                if output.exit_code == Some(EXIT_FINDINGS) {
                    let findings = parser::parse_findings(&output.stdout, &target, &file);
                    self.complete(&file, generation, findings, fingerprint)
                        .await;
                } else {
                    let notices = parser::parse_tool_output(&output.stdout);
                    if notices.is_empty() {
                        if output.stdout.trim().is_empty() {
                            // Clean run: no findings to report
                            self.complete(&file, generation, Vec::new(), fingerprint)
                                .await;
                        } else {
                            let code = output
                                .exit_code
                                .map_or_else(|| "signal".to_string(), |c| c.to_string());
                            self.surface.notify(
                                NoticeSeverity::Error,
                                &format!("phpstan produced unrecognized output (exit code {code})"),
                            );
                            self.finish_without_update(&file, generation).await;
                        }
                    } else {
                        for (severity, message) in &notices {
                            self.surface.notify(*severity, message);
                        }
                        self.finish_without_update(&file, generation).await;
                    }
                }
            }
        }
    }

    async fn matches_fingerprint(&self, file: &Path, generation: u64, fingerprint: u64) -> bool {
        self.files.lock().await.get(file).is_some_and(|state| {
            state.generation == generation && state.fingerprint == Some(fingerprint)
        })
    }

    /// Replaces the file's result set wholesale and re-publishes the
    /// merged view.
    async fn complete(
        &self,
        file: &Path,
        generation: u64,
        findings: Vec<Finding>,
        fingerprint: Option<u64>,
    ) {
        {
            let mut files = self.files.lock().await;
            let Some(state) = files.get_mut(file) else {
                return;
            };
            if state.generation != generation {
                return;
            }
            state.results = findings;
            state.fingerprint = fingerprint;
            state.phase = Phase::Done;
        }
        self.publish().await;
        self.publish_busy().await;
    }

    /// Ends a run without touching cached results (tool failure paths):
    /// previous diagnostics stay visible instead of going blank.
    async fn finish_without_update(&self, file: &Path, generation: u64) {
        self.set_phase(file, generation, Phase::Done).await;
        self.publish().await;
        self.publish_busy().await;
    }

    /// Rebuilds and publishes the merged diagnostic view across every
    /// tracked file. The surface is fully replaced on each pass, so
    /// per-file partial updates can never lose other files' findings.
    async fn publish(&self) {
        let (merged, keys) = {
            let files = self.files.lock().await;
            let mut merged: Vec<Finding> = Vec::new();
            let mut keys: Vec<PathBuf> = Vec::with_capacity(files.len());
            for (file, state) in files.iter() {
                keys.push(file.clone());
                merged.extend(state.results.iter().cloned());
                if matches!(state.phase, Phase::Queued | Phase::Running) {
                    merged.push(queued_placeholder(file));
                }
            }
            (merged, keys)
        };

        let mut map = {
            let documents = self.documents.lock().await;
            render::render(&merged, &documents)
        };
        // Emit explicit empty batches so a file whose findings vanished
        // is cleared rather than left stale.
        for key in keys {
            map.entry(key).or_default();
        }

        self.surface.publish(map);
    }

    async fn publish_busy(&self) {
        let busy = self
            .files
            .lock()
            .await
            .values()
            .any(|state| matches!(state.phase, Phase::Queued | Phase::Running));
        self.surface.set_busy(busy);
    }
}

/// The synthetic placeholder shown while a run is pending.
fn queued_placeholder(file: &Path) -> Finding {
    Finding {
        file: file.to_path_buf(),
        line: 1,
        message: format!("{TOOL_TAG} analysis queued"),
        severity: Severity::Info,
    }
}

fn is_php(file: &Path) -> bool {
    file.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("php"))
}

/// Explicit project config wins; otherwise the owning root is probed
/// for the conventional filenames, first match wins.
fn resolve_project_config(settings: &Settings, root: &Path) -> Option<PathBuf> {
    if let Some(project_file) = &settings.project_file {
        return Some(project_file.clone());
    }
    PROJECT_CONFIG_NAMES
        .iter()
        .map(|name| root.join(name))
        .find(|candidate| candidate.exists())
}

/// Writes an unsaved buffer to a temp `.php` file. The file is deleted
/// when the returned handle drops.
fn write_snapshot(text: &str) -> std::io::Result<NamedTempFile> {
    let mut tmp = tempfile::Builder::new()
        .prefix("stanchion-")
        .suffix(".php")
        .tempfile()?;
    tmp.write_all(text.as_bytes())?;
    tmp.flush()?;
    Ok(tmp)
}

/// FNV-1a content fingerprint. Determinism and low collision probability
/// are all that matters here, not cryptographic strength.
fn fnv1a_hash(input: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    let mut hash: u64 = FNV_OFFSET;
    for byte in input.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

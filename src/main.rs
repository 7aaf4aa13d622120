// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Stanchion daemon and CLI.
//!
//! This is the main entry point for the Stanchion analysis engine. It
//! can run as a long-lived daemon serving editor plugins over a Unix
//! socket, run a one-shot analysis from the command line, or report
//! where it would find the phpstan binary.

#![allow(clippy::print_stdout, reason = "CLI tool needs to output to stdout")]
#![allow(clippy::print_stderr, reason = "CLI tool needs to output to stderr")]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stanchion::config::Settings;
use stanchion::engine::Scheduler;
use stanchion::ipc::EventServer;
use stanchion::phpstan::{self, AnalyzerCommand, EXIT_FINDINGS, RunResult};
use stanchion::surface::{DiagnosticMap, EditorSurface, NoticeSeverity};

/// Command-line arguments for Stanchion.
#[derive(Parser, Debug)]
#[command(name = "stanchion")]
#[command(about = "Editor-side scheduling engine for PHPStan")]
#[command(version = env!("STANCHION_VERSION"))]
struct Args {
    /// The subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Workspace root directories. Can be specified multiple times.
    #[arg(short, long, global = true)]
    root: Vec<PathBuf>,
}

/// Subcommands supported by Stanchion.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the analysis daemon (default if no subcommand given).
    /// Editor events arrive on the Unix socket; diagnostics, notices,
    /// and busy-state updates are written to stdout as JSON lines.
    Serve {
        /// Unix socket path for editor events. Defaults to a per-user
        /// runtime directory.
        #[arg(long)]
        socket: Option<PathBuf>,
    },

    /// Analyze one file and print its findings, bypassing the daemon.
    /// Exits 1 when findings are reported, 0 on a clean run.
    Check {
        /// The PHP file to analyze.
        file: PathBuf,

        /// Path to the phpstan binary. Overrides configuration and
        /// discovery.
        #[arg(long)]
        binary: Option<PathBuf>,

        /// Rule level. Overrides configuration.
        #[arg(long)]
        level: Option<String>,

        /// Extra argument passed through to phpstan verbatim. Can be
        /// specified multiple times.
        #[arg(long = "option", allow_hyphen_values = true)]
        options: Vec<String>,
    },

    /// Print the phpstan binary path that discovery would use.
    Discover,
}

/// Entry point for the Stanchion binary.
///
/// # Errors
///
/// Returns an error if the subcommand fails.
#[tokio::main]
async fn main() -> Result<()> {
    let mut args = Args::parse();

    match args.command.take() {
        None => run_serve(args, None).await,
        Some(Command::Serve { socket }) => run_serve(args, socket).await,
        Some(Command::Check {
            file,
            binary,
            level,
            options,
        }) => run_check(&args, file, binary, level, options).await,
        Some(Command::Discover) => run_discover(&args),
    }
}

/// A surface that writes JSON lines to stdout. The editor plugin that
/// spawned the daemon reads them from the child's stdout pipe.
struct JsonSurface;

impl JsonSurface {
    fn emit(value: &serde_json::Value) {
        let mut stdout = std::io::stdout().lock();
        // A broken pipe here means the editor went away; nothing to do.
        let _ = writeln!(stdout, "{value}");
        let _ = stdout.flush();
    }
}

impl EditorSurface for JsonSurface {
    fn publish(&self, diagnostics: DiagnosticMap) {
        let files: serde_json::Map<String, serde_json::Value> = diagnostics
            .into_iter()
            .map(|(path, diags)| {
                (
                    path.to_string_lossy().into_owned(),
                    serde_json::to_value(diags).unwrap_or_default(),
                )
            })
            .collect();
        Self::emit(&serde_json::json!({ "kind": "diagnostics", "files": files }));
    }

    fn notify(&self, severity: NoticeSeverity, message: &str) {
        Self::emit(&serde_json::json!({
            "kind": "notice",
            "severity": severity,
            "message": message,
        }));
    }

    fn set_busy(&self, busy: bool) {
        Self::emit(&serde_json::json!({ "kind": "busy", "busy": busy }));
    }
}

/// Default socket path: runtime dir, falling back to the temp dir.
fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("stanchion.sock")
}

/// Resolves workspace roots, defaulting to the current directory.
fn resolve_roots(raw: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let raw = if raw.is_empty() {
        &[PathBuf::from(".")][..]
    } else {
        raw
    };
    raw.iter()
        .map(|r| {
            r.canonicalize()
                .with_context(|| format!("Invalid workspace root: {}", r.display()))
        })
        .collect()
}

/// Runs the daemon: event socket in, JSON lines out.
async fn run_serve(args: Args, socket: Option<PathBuf>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("stanchion=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::load(args.config.clone())?;
    let roots = resolve_roots(&args.root)?;

    info!("Starting stanchion analysis daemon");
    info!(
        "Workspace roots: {}",
        roots
            .iter()
            .map(|r| r.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let scheduler = Arc::new(Scheduler::new(settings, roots, Arc::new(JsonSurface)));
    let shutdown = Arc::new(tokio::sync::Notify::new());

    let socket_path = socket.unwrap_or_else(default_socket_path);
    let event_handle = EventServer::new(scheduler, shutdown.clone()).start(&socket_path)?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Received shutdown signal");
        }
        () = shutdown.notified() => {
            info!("Shutdown requested over the event socket");
        }
    }

    event_handle.abort();
    let _ = event_handle.await;
    let _ = std::fs::remove_file(&socket_path);

    Ok(())
}

/// Runs a one-shot analysis of a single file.
async fn run_check(
    args: &Args,
    file: PathBuf,
    binary: Option<PathBuf>,
    level: Option<String>,
    options: Vec<String>,
) -> Result<()> {
    let mut settings = Settings::load(args.config.clone())?;
    if let Some(level) = level {
        settings.level = level;
    }
    settings.options.extend(options);

    let roots = resolve_roots(&args.root)?;
    let file = file
        .canonicalize()
        .with_context(|| format!("Cannot read {}", file.display()))?;

    let binary = binary
        .or_else(|| settings.binary_path.clone())
        .or_else(|| phpstan::binary::discover_default(&roots))
        .context("No phpstan binary found (vendor/bin, composer home, PATH)")?;

    let command = AnalyzerCommand {
        binary,
        level: settings.level.clone(),
        autoload_file: settings.autoload_file.clone(),
        project_file: settings.project_file.clone(),
        memory_limit: settings.memory_limit.clone(),
        options: settings.options.clone(),
        target: file.clone(),
        working_dir: roots.first().cloned(),
    };

    // One-shot runs are never cancelled; the sender is simply kept alive.
    let (_kill_tx, kill_rx) = tokio::sync::oneshot::channel();
    let result = phpstan::process::run(&command, kill_rx).await?;

    let RunResult::Completed(output) = result else {
        anyhow::bail!("Analysis did not complete");
    };

    if output.exit_code == Some(EXIT_FINDINGS) {
        let findings = phpstan::parser::parse_findings(&output.stdout, &file, &file);
        for finding in &findings {
            println!(
                "{}:{}: {}",
                finding.file.display(),
                finding.line,
                finding.message
            );
        }
        if !findings.is_empty() {
            std::process::exit(EXIT_FINDINGS);
        }
        return Ok(());
    }

    let trimmed = output.stdout.trim();
    if trimmed.is_empty() {
        println!("No errors");
        return Ok(());
    }
    anyhow::bail!("phpstan failed:\n{trimmed}");
}

/// Prints the phpstan binary path discovery would use.
fn run_discover(args: &Args) -> Result<()> {
    let settings = Settings::load(args.config.clone())?;
    let roots = resolve_roots(&args.root)?;

    if let Some(path) = settings.binary_path {
        println!("{} (configured)", path.display());
        return Ok(());
    }

    match phpstan::binary::discover_default(&roots) {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => anyhow::bail!("No phpstan binary found (vendor/bin, composer home, PATH)"),
    }
}

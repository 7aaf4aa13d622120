// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Analyzer process invocation.
//!
//! Builds the phpstan argument vector, spawns the process, streams
//! stdout fully into memory, and classifies spawn failures so the
//! scheduler can tell "binary vanished" from other I/O errors. Runs are
//! single-file, so there is no incremental line parsing here.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Exit code meaning "analysis ran, findings attached in stdout".
///
/// This is a versioned contract with phpstan's current behavior. Any
/// other exit code carries tool-level messages instead of per-line
/// findings; stdout that matches neither shape is surfaced as a
/// recoverable error by the scheduler.
pub const EXIT_FINDINGS: i32 = 1;

/// Why the analyzer process failed to start.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The executable does not exist (ENOENT). The scheduler reacts by
    /// clearing the resolved binary path, forcing rediscovery.
    #[error("phpstan binary not found: {0}")]
    NotFound(PathBuf),

    /// The executable exists but cannot be run.
    #[error("phpstan binary is not executable: {0}")]
    PermissionDenied(PathBuf),

    /// Any other I/O failure while spawning or reaping the process.
    #[error("failed to run phpstan: {0}")]
    Io(#[from] std::io::Error),
}

/// Output of a run that reached process exit.
#[derive(Debug)]
pub struct RunOutput {
    /// Exit code, or `None` if the process died from a signal.
    pub exit_code: Option<i32>,
    /// Full stdout text (lossy UTF-8).
    pub stdout: String,
}

/// Outcome of [`run`].
#[derive(Debug)]
pub enum RunResult {
    /// The process exited on its own.
    Completed(RunOutput),
    /// The process was killed through the kill channel.
    Killed,
}

/// A fully resolved analyzer invocation.
#[derive(Debug, Clone)]
pub struct AnalyzerCommand {
    /// Path to the phpstan executable.
    pub binary: PathBuf,
    /// Rule level (`--level=<level>`).
    pub level: String,
    /// Optional autoload script (`--autoload-file=<path>`).
    pub autoload_file: Option<PathBuf>,
    /// Optional project configuration (`-c <path>`).
    pub project_file: Option<PathBuf>,
    /// Memory limit (`--memory-limit=<limit>`).
    pub memory_limit: String,
    /// Extra options appended before the target path.
    pub options: Vec<String>,
    /// The file to analyze (on-disk path or temp snapshot).
    pub target: PathBuf,
    /// Working directory; the owning workspace root when resolvable.
    pub working_dir: Option<PathBuf>,
}

impl AnalyzerCommand {
    /// Builds the argument vector, excluding the binary itself.
    #[must_use]
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            OsString::from("analyse"),
            OsString::from(format!("--level={}", self.level)),
        ];
        if let Some(autoload) = &self.autoload_file {
            let mut arg = OsString::from("--autoload-file=");
            arg.push(autoload);
            args.push(arg);
        }
        if let Some(project) = &self.project_file {
            args.push(OsString::from("-c"));
            args.push(project.clone().into());
        }
        args.push(OsString::from("--error-format=raw"));
        args.push(OsString::from(format!(
            "--memory-limit={}",
            self.memory_limit
        )));
        args.extend(self.options.iter().map(OsString::from));
        args.push(self.target.clone().into());
        args
    }
}

/// Runs the analyzer to completion, or until `kill` fires.
///
/// Stdout is collected wholesale; stderr is inherited so tool noise
/// lands in the daemon log. On kill, the child is terminated and reaped
/// before returning — the caller's cleanup (lock release, snapshot
/// deletion) is RAII and runs on every path.
///
/// # Errors
///
/// Returns a classified [`SpawnError`] if the process cannot be started
/// or reaped.
pub async fn run(
    cmd: &AnalyzerCommand,
    kill: oneshot::Receiver<()>,
) -> Result<RunResult, SpawnError> {
    let mut command = Command::new(&cmd.binary);
    command
        .args(cmd.args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    if let Some(dir) = &cmd.working_dir {
        command.current_dir(dir);
    }

    debug!(
        "Spawning phpstan: {} {:?}",
        cmd.binary.display(),
        cmd.args()
    );

    let mut child = command.spawn().map_err(|e| classify(e, &cmd.binary))?;

    let Some(mut stdout) = child.stdout.take() else {
        // Stdio::piped above guarantees this in practice
        let _ = child.kill().await;
        return Err(SpawnError::Io(std::io::Error::other(
            "child stdout not captured",
        )));
    };

    let mut buf = Vec::new();
    tokio::select! {
        read = stdout.read_to_end(&mut buf) => {
            if let Err(e) = read {
                warn!("Failed to read phpstan stdout: {e}");
            }
            let status = child.wait().await?;
            Ok(RunResult::Completed(RunOutput {
                exit_code: status.code(),
                stdout: String::from_utf8_lossy(&buf).into_owned(),
            }))
        }
        _ = kill => {
            debug!("Killing phpstan run for {}", cmd.target.display());
            let _ = child.kill().await;
            Ok(RunResult::Killed)
        }
    }
}

/// Maps a spawn error onto the scheduler-facing taxonomy.
fn classify(err: std::io::Error, binary: &std::path::Path) -> SpawnError {
    match err.kind() {
        std::io::ErrorKind::NotFound => SpawnError::NotFound(binary.to_path_buf()),
        std::io::ErrorKind::PermissionDenied => SpawnError::PermissionDenied(binary.to_path_buf()),
        _ => SpawnError::Io(err),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests {
    use super::*;
    use std::time::Duration;

    fn command(binary: PathBuf, target: &str) -> AnalyzerCommand {
        AnalyzerCommand {
            binary,
            level: "max".to_string(),
            autoload_file: None,
            project_file: None,
            memory_limit: "1G".to_string(),
            options: Vec::new(),
            target: PathBuf::from(target),
            working_dir: None,
        }
    }

    #[test]
    fn args_minimal() {
        let cmd = command(PathBuf::from("phpstan"), "/tmp/x.php");
        let args: Vec<String> = cmd
            .args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "analyse",
                "--level=max",
                "--error-format=raw",
                "--memory-limit=1G",
                "/tmp/x.php",
            ]
        );
    }

    #[test]
    fn args_full() {
        let mut cmd = command(PathBuf::from("phpstan"), "/tmp/x.php");
        cmd.level = "7".to_string();
        cmd.autoload_file = Some(PathBuf::from("/proj/autoload.php"));
        cmd.project_file = Some(PathBuf::from("/proj/phpstan.neon"));
        cmd.memory_limit = "512M".to_string();
        cmd.options = vec!["--no-progress".to_string()];

        let args: Vec<String> = cmd
            .args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "analyse",
                "--level=7",
                "--autoload-file=/proj/autoload.php",
                "-c",
                "/proj/phpstan.neon",
                "--error-format=raw",
                "--memory-limit=512M",
                "--no-progress",
                "/tmp/x.php",
            ]
        );
    }

    #[cfg(unix)]
    fn script(dir: &std::path::Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-phpstan");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn completed_run_collects_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script(dir.path(), "echo '/tmp/x.php:5:oops'; exit 1");
        let cmd = command(binary, "/tmp/x.php");

        let (_tx, rx) = oneshot::channel();
        let result = run(&cmd, rx).await.unwrap();
        match result {
            RunResult::Completed(out) => {
                assert_eq!(out.exit_code, Some(EXIT_FINDINGS));
                assert!(out.stdout.contains("/tmp/x.php:5:oops"));
            }
            RunResult::Killed => unreachable!("run was not killed"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kill_terminates_run() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script(dir.path(), "sleep 30");
        let cmd = command(binary, "/tmp/x.php");

        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move { run(&cmd, rx).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(matches!(result, RunResult::Killed));
    }

    #[tokio::test]
    async fn missing_binary_classified() {
        let cmd = command(PathBuf::from("/nonexistent/phpstan"), "/tmp/x.php");
        let (_tx, rx) = oneshot::channel();
        let err = run(&cmd, rx).await.unwrap_err();
        assert!(matches!(err, SpawnError::NotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_executable_binary_classified() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("fake-phpstan");
        std::fs::write(&binary, "not a script").unwrap();

        let cmd = command(binary, "/tmp/x.php");
        let (_tx, rx) = oneshot::channel();
        let err = run(&cmd, rx).await.unwrap_err();
        assert!(matches!(err, SpawnError::PermissionDenied(_)));
    }
}

// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Unix socket server for editor events.
//!
//! Editor plugins connect to this socket and stream newline-delimited
//! JSON events (`opened`, `changed`, `saved`, `closed`, `active`,
//! `cancel`). Each event is acknowledged on its own line so plugins can
//! pipeline without framing ambiguity. Buffer edits only update the
//! document store; analysis is scheduled on open, save, and activation
//! so typing never triggers runs by itself.

use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::engine::Scheduler;

/// One editor event, tagged by kind.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum EditorEvent {
    /// A document was opened; `text` is its current content.
    Opened { file: PathBuf, text: String },
    /// The buffer was edited; the document becomes dirty.
    Changed { file: PathBuf, text: String },
    /// The buffer was saved. `text` replaces the tracked content when
    /// present.
    Saved {
        file: PathBuf,
        #[serde(default)]
        text: Option<String>,
    },
    /// The document was closed; its buffer state is evicted.
    Closed { file: PathBuf },
    /// The user switched to this document.
    Active { file: PathBuf },
    /// Explicit request to cancel pending work for this document.
    Cancel { file: PathBuf },
    /// The editor-side configuration changed.
    Settings { settings: Settings },
    /// Request a graceful daemon shutdown.
    Shutdown,
}

/// Listens on a Unix socket and feeds editor events to the scheduler.
pub struct EventServer {
    scheduler: Arc<Scheduler>,
    shutdown: Arc<Notify>,
}

impl EventServer {
    /// Creates a new `EventServer`. The `shutdown` notify is signalled
    /// when a client sends the `shutdown` event.
    #[must_use]
    pub fn new(scheduler: Arc<Scheduler>, shutdown: Arc<Notify>) -> Self {
        Self {
            scheduler,
            shutdown,
        }
    }

    /// Starts listening on the given Unix socket path.
    ///
    /// Spawns a background task that accepts connections and processes
    /// events. Returns a `JoinHandle` for the listener task.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub fn start(self, socket_path: &std::path::Path) -> Result<tokio::task::JoinHandle<()>> {
        // Remove stale socket file if it exists
        let _ = std::fs::remove_file(socket_path);

        let listener = UnixListener::bind(socket_path).map_err(|e| {
            anyhow!(
                "Failed to bind event socket {}: {e}",
                socket_path.display()
            )
        })?;

        info!("Event socket listening on {}", socket_path.display());

        let server = Arc::new(self);

        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let server = server.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server.handle_connection(stream).await {
                                debug!("Event connection error: {e}");
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Event socket accept error: {e}");
                    }
                }
            }
        });

        Ok(handle)
    }

    /// Handles one connection: a stream of newline-delimited JSON
    /// events, each acknowledged with `ok` or an error line.
    async fn handle_connection(&self, stream: tokio::net::UnixStream) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<EditorEvent>(&line) {
                Ok(event) => {
                    self.dispatch(event).await;
                    "ok".to_string()
                }
                Err(e) => format!("error: invalid event: {e}"),
            };
            writer.write_all(response.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }

        Ok(())
    }

    async fn dispatch(&self, event: EditorEvent) {
        match event {
            EditorEvent::Opened { file, text } => {
                debug!("Event: opened {}", file.display());
                self.scheduler.documents().lock().await.opened(&file, text);
                self.scheduler.submit(&file).await;
            }
            EditorEvent::Changed { file, text } => {
                // Dirty tracking only; the next scheduled run picks up
                // the buffer through a snapshot.
                self.scheduler.documents().lock().await.changed(&file, text);
            }
            EditorEvent::Saved { file, text } => {
                debug!("Event: saved {}", file.display());
                self.scheduler.documents().lock().await.saved(&file, text);
                self.scheduler.submit(&file).await;
            }
            EditorEvent::Closed { file } => {
                debug!("Event: closed {}", file.display());
                self.scheduler.document_closed(&file).await;
            }
            EditorEvent::Active { file } => {
                self.scheduler.submit(&file).await;
            }
            EditorEvent::Cancel { file } => {
                debug!("Event: cancel {}", file.display());
                self.scheduler.cancel(&file).await;
            }
            EditorEvent::Settings { settings } => {
                info!("Event: settings update");
                self.scheduler.update_settings(settings).await;
            }
            EditorEvent::Shutdown => {
                info!("Event: shutdown requested");
                self.shutdown.notify_one();
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests {
    use super::*;

    #[test]
    fn events_deserialize() {
        let opened: EditorEvent =
            serde_json::from_str(r#"{"event":"opened","file":"/a.php","text":"<?php"}"#).unwrap();
        assert!(matches!(opened, EditorEvent::Opened { .. }));

        let saved: EditorEvent =
            serde_json::from_str(r#"{"event":"saved","file":"/a.php"}"#).unwrap();
        match saved {
            EditorEvent::Saved { file, text } => {
                assert_eq!(file, PathBuf::from("/a.php"));
                assert!(text.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let cancel: EditorEvent =
            serde_json::from_str(r#"{"event":"cancel","file":"/a.php"}"#).unwrap();
        assert!(matches!(cancel, EditorEvent::Cancel { .. }));

        let shutdown: EditorEvent = serde_json::from_str(r#"{"event":"shutdown"}"#).unwrap();
        assert!(matches!(shutdown, EditorEvent::Shutdown));
    }

    #[test]
    fn settings_event_uses_defaults_for_missing_fields() {
        let event: EditorEvent =
            serde_json::from_str(r#"{"event":"settings","settings":{"level":"5"}}"#).unwrap();
        match event {
            EditorEvent::Settings { settings } => {
                assert_eq!(settings.level, "5");
                assert!(settings.enabled);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_rejected() {
        let result = serde_json::from_str::<EditorEvent>(r#"{"event":"bogus","file":"/a.php"}"#);
        assert!(result.is_err());
    }
}

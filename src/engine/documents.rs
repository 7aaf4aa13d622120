// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Tracks the text of open editor buffers.
//!
//! The scheduler needs two things from a live document: whether it has
//! unsaved modifications (to decide between analyzing the on-disk path
//! and a temp snapshot) and line-indexed text access (so the renderer
//! can compute tight column ranges). Documents are evicted when the
//! editor closes them; nothing accumulates for the process lifetime.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// State of one open document.
#[derive(Debug)]
struct Document {
    text: String,
    dirty: bool,
}

/// Maps absolute file paths to open-buffer state.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: HashMap<PathBuf, Document>,
}

impl DocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly opened document with its current text.
    pub fn opened(&mut self, path: &Path, text: String) {
        self.documents
            .insert(path.to_path_buf(), Document { text, dirty: false });
    }

    /// Records an in-buffer edit; the document becomes dirty.
    pub fn changed(&mut self, path: &Path, text: String) {
        self.documents
            .insert(path.to_path_buf(), Document { text, dirty: true });
    }

    /// Records a save. When `text` is provided it replaces the tracked
    /// content; either way the document is clean afterwards.
    pub fn saved(&mut self, path: &Path, text: Option<String>) {
        match self.documents.get_mut(path) {
            Some(doc) => {
                if let Some(text) = text {
                    doc.text = text;
                }
                doc.dirty = false;
            }
            None => {
                if let Some(text) = text {
                    self.opened(path, text);
                }
            }
        }
    }

    /// Evicts a closed document.
    pub fn closed(&mut self, path: &Path) {
        self.documents.remove(path);
    }

    /// Returns true if the document is open.
    #[must_use]
    pub fn is_open(&self, path: &Path) -> bool {
        self.documents.contains_key(path)
    }

    /// Returns true if the document is open and has unsaved edits.
    #[must_use]
    pub fn is_dirty(&self, path: &Path) -> bool {
        self.documents.get(path).is_some_and(|d| d.dirty)
    }

    /// Returns the full tracked text of an open document.
    #[must_use]
    pub fn text(&self, path: &Path) -> Option<&str> {
        self.documents.get(path).map(|d| d.text.as_str())
    }

    /// Returns one line of an open document by 0-based index.
    #[must_use]
    pub fn line(&self, path: &Path, index: usize) -> Option<&str> {
        self.documents.get(path)?.text.lines().nth(index)
    }
}

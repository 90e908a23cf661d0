//! In-memory per-file state, kept for the lifetime of the process.

use std::collections::HashMap;

use chrono::{DateTime, Local};
use encoding_rs::Encoding;

use crate::git::PushOutcome;

/// What the watcher knows about one configured file.
#[derive(Debug, Clone, Default)]
pub struct WatchedFile {
    /// Encoding that last decoded the file, tried first on the next change.
    pub encoding: Option<&'static Encoding>,
    pub last_trigger: Option<DateTime<Local>>,
    pub last_outcome: Option<PushOutcome>,
    /// Settled triggers handled so far.
    pub triggers: u64,
}

/// Watched files by configured name. Entries appear on first trigger.
#[derive(Debug, Default)]
pub struct FileTable {
    files: HashMap<String, WatchedFile>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `name`, created on first use.
    pub fn entry(&mut self, name: &str) -> &mut WatchedFile {
        self.files.entry(name.to_string()).or_default()
    }

    pub fn get(&self, name: &str) -> Option<&WatchedFile> {
        self.files.get(name)
    }

    /// Total triggers across all files.
    pub fn total_triggers(&self) -> u64 {
        self.files.values().map(|file| file.triggers).sum()
    }
}

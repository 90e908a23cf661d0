//! What happens when a watched file settles.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use parking_lot::Mutex;

use super::WatchError;
use super::state::{FileTable, WatchedFile};
use crate::encoding::{EncodingError, EncodingReader};
use crate::git::{GitPublisher, PushOutcome};

/// Handles debounced triggers from the orchestrator.
#[async_trait]
pub trait TriggerHandler: Send + Sync {
    /// Handler name for logging.
    fn name(&self) -> &str;

    /// `file` has been quiet for the full quiet period.
    ///
    /// `Err` means the trigger was abandoned before publishing.
    async fn on_settled(&self, file: &str, path: &Path) -> Result<PushOutcome, WatchError>;
}

/// Probes the file's encoding, then publishes it.
pub struct PublishHandler {
    publisher: Arc<GitPublisher>,
    /// `None` skips the encoding probe.
    reader: Option<EncodingReader>,
    files: Mutex<FileTable>,
}

impl PublishHandler {
    pub fn new(publisher: Arc<GitPublisher>, reader: Option<EncodingReader>) -> Self {
        Self {
            publisher,
            reader,
            files: Mutex::new(FileTable::new()),
        }
    }

    /// Snapshot of what is known about `file`.
    pub fn file_state(&self, file: &str) -> Option<WatchedFile> {
        self.files.lock().get(file).cloned()
    }

    pub fn total_triggers(&self) -> u64 {
        self.files.lock().total_triggers()
    }

    /// Read the file with its remembered encoding, probing when unknown.
    ///
    /// The read and decode run on the blocking pool.
    async fn probe(
        &self,
        reader: &EncodingReader,
        file: &str,
        path: &Path,
    ) -> Result<(), EncodingError> {
        let remembered = self.files.lock().entry(file).encoding;
        let (result, remembered) = tokio::task::spawn_blocking({
            let reader = reader.clone();
            let path = path.to_path_buf();
            move || {
                let mut remembered = remembered;
                let result = reader.read_remembered(&path, &mut remembered);
                (result, remembered)
            }
        })
        .await
        .map_err(|e| EncodingError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        })?;
        self.files.lock().entry(file).encoding = remembered;

        let decoded = result?;
        crate::debug_event!(
            "encoding",
            "decoded",
            "{file} as {} ({} chars)",
            decoded.encoding.name(),
            decoded.content.chars().count()
        );
        Ok(())
    }

    fn record(&self, file: &str, outcome: &PushOutcome) {
        self.files.lock().entry(file).last_outcome = Some(outcome.clone());
    }
}

#[async_trait]
impl TriggerHandler for PublishHandler {
    fn name(&self) -> &str {
        "publish"
    }

    async fn on_settled(&self, file: &str, path: &Path) -> Result<PushOutcome, WatchError> {
        {
            let mut files = self.files.lock();
            let entry = files.entry(file);
            entry.triggers += 1;
            entry.last_trigger = Some(Local::now());
        }

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            tracing::warn!("[publish] {file} no longer exists, skipping");
            self.record(file, &PushOutcome::FileMissing);
            return Ok(PushOutcome::FileMissing);
        }

        if let Some(reader) = &self.reader {
            match self.probe(reader, file, path).await {
                Ok(()) => {}
                Err(EncodingError::Io { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    tracing::warn!("[publish] {file} vanished before it could be read");
                    self.record(file, &PushOutcome::FileMissing);
                    return Ok(PushOutcome::FileMissing);
                }
                Err(source) => {
                    return Err(WatchError::Unreadable {
                        file: file.to_string(),
                        source,
                    });
                }
            }
        }

        let outcome = self.publisher.publish_file(path, file).await;
        self.record(file, &outcome);

        if outcome.is_failure() {
            tracing::error!("[publish] {file}: {outcome}");
        } else {
            crate::log_event!("publish", "done", "{file}: {outcome}");
        }
        Ok(outcome)
    }
}

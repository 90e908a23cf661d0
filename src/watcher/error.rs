//! Error types for the watch loop.

use std::path::PathBuf;
use thiserror::Error;

use crate::encoding::EncodingError;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Cannot read {file}: {source}")]
    Unreadable {
        file: String,
        #[source]
        source: EncodingError,
    },

    #[error("Change source '{source_name}' stopped: {reason}")]
    SourceStopped {
        source_name: &'static str,
        reason: String,
    },

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

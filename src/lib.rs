//! Watch a handful of files in a git work tree and publish each change.
//!
//! When a watched file has been quiet for the configured period it is
//! staged, committed and pushed. Files may be saved in any of a list of
//! candidate text encodings; each file is decoded before it is published.

pub mod cli;
pub mod config;
pub mod encoding;
pub mod git;
pub mod logging;
pub mod watcher;

pub use config::Settings;
pub use encoding::{Decoded, EncodingError, EncodingReader};
pub use git::{GitBackend, GitCli, GitError, GitPublisher, PushOutcome};
pub use watcher::{AutoPushWatcher, WatchError, WatchSummary};

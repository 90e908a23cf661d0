//! Pluggable change notification sources.
//!
//! A source pushes raw [`ChangeEvent`]s into the orchestrator's channel
//! until its cancellation token fires. Filtering against the allow-list
//! and debouncing happen downstream, so a source may over-report.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use super::WatchError;

/// A file that may have changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Something that reports file changes.
#[async_trait]
pub trait ChangeSource: Send {
    /// Source name for logging.
    fn name(&self) -> &'static str;

    /// Deliver events until `shutdown` is cancelled or `events` closes.
    async fn run(
        &mut self,
        events: mpsc::Sender<ChangeEvent>,
        shutdown: CancellationToken,
    ) -> Result<(), WatchError>;
}

/// Native filesystem notifications through `notify`.
///
/// Watches each directory non-recursively and forwards modify and create
/// events for non-directory paths.
pub struct NotifySource {
    dirs: Vec<PathBuf>,
}

impl NotifySource {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

#[async_trait]
impl ChangeSource for NotifySource {
    fn name(&self) -> &'static str {
        "notify"
    }

    async fn run(
        &mut self,
        events: mpsc::Sender<ChangeEvent>,
        shutdown: CancellationToken,
    ) -> Result<(), WatchError> {
        let (tx, mut rx) = mpsc::channel(100);

        // The callback runs on notify's own thread
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.blocking_send(res);
        })?;

        let mut watched = 0;
        for dir in &self.dirs {
            match watcher.watch(dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    crate::debug_event!("watcher", "watching", "{}", dir.display());
                    watched += 1;
                }
                Err(e) => {
                    tracing::warn!("[watcher] failed to watch {}: {e}", dir.display());
                }
            }
        }

        if watched == 0 {
            return Err(WatchError::PathWatchFailed {
                path: self.dirs.first().cloned().unwrap_or_default(),
                reason: "no directory could be watched".to_string(),
            });
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                res = rx.recv() => {
                    let Some(res) = res else {
                        return Err(WatchError::ChannelClosed);
                    };
                    let event = match res {
                        Ok(event) => event,
                        Err(e) => {
                            tracing::error!("[watcher] file watch error: {e}");
                            continue;
                        }
                    };
                    if !is_content_change(&event.kind) {
                        continue;
                    }
                    for path in event.paths {
                        if path.is_dir() {
                            continue;
                        }
                        if events.send(ChangeEvent { path }).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }

        crate::debug_event!("watcher", "notify source stopped");
        Ok(())
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_))
}

/// Fixed-interval polling by content hash.
///
/// For filesystems without native notifications (network mounts, some
/// containers). A file whose SHA-256 differs from the previous poll is
/// reported; a file that disappears keeps its last known hash, so it is
/// reported again only once its content is back and different.
pub struct PollSource {
    files: Vec<PathBuf>,
    every: Duration,
    hashes: HashMap<PathBuf, String>,
}

impl PollSource {
    pub fn new(files: Vec<PathBuf>, every: Duration) -> Self {
        Self {
            files,
            every,
            hashes: HashMap::new(),
        }
    }

    /// Record the current hashes without reporting anything.
    async fn prime(&mut self) {
        for path in &self.files {
            if let Some(hash) = content_hash(path).await {
                self.hashes.insert(path.clone(), hash);
            }
        }
    }

    /// Files whose content changed since the last poll.
    async fn poll(&mut self) -> Vec<PathBuf> {
        let mut changed = Vec::new();
        for path in &self.files {
            let Some(hash) = content_hash(path).await else {
                continue;
            };
            if self.hashes.get(path) != Some(&hash) {
                self.hashes.insert(path.clone(), hash);
                changed.push(path.clone());
            }
        }
        changed
    }
}

#[async_trait]
impl ChangeSource for PollSource {
    fn name(&self) -> &'static str {
        "poll"
    }

    async fn run(
        &mut self,
        events: mpsc::Sender<ChangeEvent>,
        shutdown: CancellationToken,
    ) -> Result<(), WatchError> {
        self.prime().await;

        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                _ = ticker.tick() => {
                    for path in self.poll().await {
                        crate::debug_event!("poll", "content changed", "{}", path.display());
                        if events.send(ChangeEvent { path }).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }

        crate::debug_event!("poll", "stopped");
        Ok(())
    }
}

async fn content_hash(path: &std::path::Path) -> Option<String> {
    let bytes = tokio::fs::read(path).await.ok()?;
    Some(format!("{:x}", Sha256::digest(&bytes)))
}

//! Stage, commit and push one file.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::Mutex;

use super::GitBackend;
use crate::config::GitConfig;

/// Timestamp format embedded in commit messages.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Result of one publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Staged content matched HEAD; nothing committed or pushed.
    NoOp,
    /// Committed and pushed.
    Success,
    /// `git add` or the staged-diff check after it failed.
    AddFailed(String),
    CommitFailed(String),
    /// The commit exists locally and goes out with the next successful push.
    PushFailed(String),
    FileMissing,
}

impl PushOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PushOutcome::AddFailed(_) | PushOutcome::CommitFailed(_) | PushOutcome::PushFailed(_)
        )
    }
}

impl fmt::Display for PushOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushOutcome::NoOp => write!(f, "no changes to commit"),
            PushOutcome::Success => write!(f, "pushed"),
            PushOutcome::AddFailed(diag) => write!(f, "staging failed: {diag}"),
            PushOutcome::CommitFailed(diag) => write!(f, "git commit failed: {diag}"),
            PushOutcome::PushFailed(diag) => write!(f, "git push failed: {diag}"),
            PushOutcome::FileMissing => write!(f, "file not found"),
        }
    }
}

/// Publishes file changes to the configured remote branch.
///
/// All publishers sharing a repository must share one instance: the
/// commit lock serializes index mutations, the push lock serializes pushes.
pub struct GitPublisher {
    backend: Arc<dyn GitBackend>,
    remote: String,
    branch: String,
    commit_template: String,
    commit_lock: Mutex<()>,
    push_lock: Mutex<()>,
}

impl GitPublisher {
    pub fn new(backend: Arc<dyn GitBackend>, config: &GitConfig) -> Self {
        Self {
            backend,
            remote: config.remote.clone(),
            branch: config.branch.clone(),
            commit_template: config.commit_template.clone(),
            commit_lock: Mutex::new(()),
            push_lock: Mutex::new(()),
        }
    }

    /// Render the commit template for `file` at `now`.
    pub fn commit_message(&self, file: &str, now: DateTime<Local>) -> String {
        self.commit_template
            .replace("{file}", file)
            .replace("{timestamp}", &now.format(TIMESTAMP_FORMAT).to_string())
    }

    /// Publish with a message rendered from the commit template.
    pub async fn publish_file(&self, path: &Path, file: &str) -> PushOutcome {
        let message = self.commit_message(file, Local::now());
        self.publish(path, &message).await
    }

    /// Stage, check for a staged difference, commit, push.
    pub async fn publish(&self, path: &Path, message: &str) -> PushOutcome {
        let name = path.display();

        if !path.exists() {
            tracing::warn!("[publish] file not found: {name}");
            return PushOutcome::FileMissing;
        }

        crate::log_event!("publish", "starting", "{name}");

        {
            let _index = self.commit_lock.lock().await;

            if let Err(e) = self.backend.stage(path).await {
                tracing::error!("[publish] git add failed for {name}: {e}");
                return PushOutcome::AddFailed(e.diagnostic());
            }

            match self.backend.has_staged_diff(path).await {
                Ok(true) => {}
                Ok(false) => {
                    crate::log_event!("publish", "no new changes", "{name}");
                    return PushOutcome::NoOp;
                }
                Err(e) => {
                    tracing::error!("[publish] staged diff check failed for {name}: {e}");
                    return PushOutcome::AddFailed(format!(
                        "staged diff check: {}",
                        e.diagnostic()
                    ));
                }
            }

            if let Err(e) = self.backend.commit(message, path).await {
                tracing::error!("[publish] git commit failed for {name}: {e}");
                return PushOutcome::CommitFailed(e.diagnostic());
            }
            crate::log_event!("publish", "committed", "{message}");
        }

        let _push = self.push_lock.lock().await;
        if let Err(e) = self.backend.push(&self.remote, &self.branch).await {
            tracing::error!(
                "[publish] git push to {}/{} failed: {e}",
                self.remote,
                self.branch
            );
            return PushOutcome::PushFailed(e.diagnostic());
        }

        crate::log_event!("publish", "pushed", "{} to {}/{}", name, self.remote, self.branch);
        PushOutcome::Success
    }
}

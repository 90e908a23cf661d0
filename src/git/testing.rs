//! In-memory git backend for tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{GitBackend, GitError};

/// Records calls and fails on request.
pub(crate) struct FakeGit {
    pub staged_diff: bool,
    pub fail_version: bool,
    pub not_repo: bool,
    pub no_remote: bool,
    pub fail_stage: bool,
    pub fail_diff: bool,
    pub fail_commit: bool,
    pub fail_push: AtomicBool,
    /// Simulated latency of `git add`.
    pub stage_delay: Option<Duration>,
    pub calls: Mutex<Vec<String>>,
}

impl Default for FakeGit {
    fn default() -> Self {
        Self {
            staged_diff: true,
            fail_version: false,
            not_repo: false,
            no_remote: false,
            fail_stage: false,
            fail_diff: false,
            fail_commit: false,
            fail_push: AtomicBool::new(false),
            stage_delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeGit {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn commits(&self) -> usize {
        self.count("commit:")
    }

    pub fn pushes(&self) -> usize {
        self.count("push:")
    }

    pub fn set_fail_push(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }
}

fn rejected(operation: &'static str) -> GitError {
    GitError::CommandFailed {
        operation,
        code: Some(1),
        stderr: format!("{operation} rejected"),
    }
}

#[async_trait]
impl GitBackend for FakeGit {
    async fn version(&self) -> Result<String, GitError> {
        if self.fail_version {
            return Err(GitError::Spawn {
                program: "git".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            });
        }
        Ok("git version 2.45.0".to_string())
    }

    async fn git_dir(&self) -> Result<PathBuf, GitError> {
        if self.not_repo {
            return Err(rejected("rev-parse"));
        }
        Ok(PathBuf::from(".git"))
    }

    async fn remote_url(&self, remote: &str) -> Result<String, GitError> {
        if self.no_remote {
            return Err(rejected("remote"));
        }
        Ok(format!("https://example.com/{remote}.git"))
    }

    async fn stage(&self, _path: &Path) -> Result<(), GitError> {
        self.record("add");
        if let Some(delay) = self.stage_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_stage {
            return Err(rejected("add"));
        }
        Ok(())
    }

    async fn has_staged_diff(&self, _path: &Path) -> Result<bool, GitError> {
        self.record("diff");
        if self.fail_diff {
            return Err(rejected("diff"));
        }
        Ok(self.staged_diff)
    }

    async fn commit(&self, message: &str, _path: &Path) -> Result<(), GitError> {
        self.record(format!("commit:{message}"));
        if self.fail_commit {
            return Err(rejected("commit"));
        }
        Ok(())
    }

    async fn push(&self, remote: &str, branch: &str) -> Result<(), GitError> {
        self.record(format!("push:{remote}/{branch}"));
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(rejected("push"));
        }
        Ok(())
    }
}

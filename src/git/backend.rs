//! The git operations autopush needs, and the subprocess implementation.

use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;

use super::GitError;

/// Operations on one repository.
///
/// Every call is independent; callers are responsible for serializing
/// operations that mutate the index.
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// `git --version`, used to confirm git is installed.
    async fn version(&self) -> Result<String, GitError>;

    /// Location of the `.git` directory; fails outside a work tree.
    async fn git_dir(&self) -> Result<PathBuf, GitError>;

    /// URL of a configured remote.
    async fn remote_url(&self, remote: &str) -> Result<String, GitError>;

    /// Stage the file's current content.
    async fn stage(&self, path: &Path) -> Result<(), GitError>;

    /// Whether the index differs from HEAD for this path.
    async fn has_staged_diff(&self, path: &Path) -> Result<bool, GitError>;

    /// Commit the staged content of this path.
    async fn commit(&self, message: &str, path: &Path) -> Result<(), GitError>;

    /// Push `branch` to `remote`.
    async fn push(&self, remote: &str, branch: &str) -> Result<(), GitError>;
}

/// Runs the git executable in a work tree.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    work_dir: PathBuf,
}

impl GitCli {
    pub fn new(program: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            work_dir: work_dir.into(),
        }
    }

    /// Paths inside the work tree are passed relative to it.
    fn pathspec<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.work_dir).unwrap_or(path)
    }

    async fn output(&self, args: &[&std::ffi::OsStr]) -> Result<Output, GitError> {
        tracing::trace!("[git] {} {:?}", self.program, args);
        Command::new(&self.program)
            .args(args)
            .current_dir(&self.work_dir)
            // Never block on a credential prompt
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|source| GitError::Spawn {
                program: self.program.clone(),
                source,
            })
    }

    /// Run and require exit status 0; returns trimmed stdout.
    async fn run(
        &self,
        operation: &'static str,
        args: &[&std::ffi::OsStr],
    ) -> Result<String, GitError> {
        let output = self.output(args).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(failure(operation, &output))
        }
    }
}

fn failure(operation: &'static str, output: &Output) -> GitError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stderr = if stderr.is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        stderr
    };
    GitError::CommandFailed {
        operation,
        code: output.status.code(),
        stderr,
    }
}

macro_rules! os_args {
    ($($arg:expr),* $(,)?) => {
        &[$(std::ffi::OsStr::new($arg)),*]
    };
}

#[async_trait]
impl GitBackend for GitCli {
    async fn version(&self) -> Result<String, GitError> {
        self.run("--version", os_args!["--version"]).await
    }

    async fn git_dir(&self) -> Result<PathBuf, GitError> {
        let dir = self.run("rev-parse", os_args!["rev-parse", "--git-dir"]).await?;
        Ok(self.work_dir.join(dir))
    }

    async fn remote_url(&self, remote: &str) -> Result<String, GitError> {
        self.run("remote", os_args!["remote", "get-url", remote])
            .await
    }

    async fn stage(&self, path: &Path) -> Result<(), GitError> {
        let spec = self.pathspec(path);
        self.run("add", os_args!["add", "--", spec]).await?;
        Ok(())
    }

    async fn has_staged_diff(&self, path: &Path) -> Result<bool, GitError> {
        let spec = self.pathspec(path);
        let output = self
            .output(os_args!["diff", "--cached", "--quiet", "--", spec])
            .await?;
        // --quiet exits 1 when there are differences
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(failure("diff", &output)),
        }
    }

    async fn commit(&self, message: &str, path: &Path) -> Result<(), GitError> {
        let spec = self.pathspec(path);
        self.run("commit", os_args!["commit", "-m", message, "--", spec])
            .await?;
        Ok(())
    }

    async fn push(&self, remote: &str, branch: &str) -> Result<(), GitError> {
        self.run("push", os_args!["push", remote, branch]).await?;
        Ok(())
    }
}

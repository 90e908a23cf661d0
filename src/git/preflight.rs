//! Startup checks: git works, we are in a repository, a remote exists,
//! and at least one watched file is present.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::{GitBackend, GitError};

/// Fatal startup conditions.
#[derive(Error, Debug)]
pub enum PreflightError {
    #[error("Git is not installed or not available: {0}")]
    GitUnavailable(#[source] GitError),

    #[error("{path} is not a git repository")]
    NotARepository {
        path: PathBuf,
        #[source]
        source: GitError,
    },

    #[error("No remote '{remote}' configured")]
    NoRemote {
        remote: String,
        #[source]
        source: GitError,
    },

    #[error("None of the watched files exist: {}", .files.join(", "))]
    NoWatchedFiles { files: Vec<String> },
}

/// What preflight found.
#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub git_version: String,
    pub git_dir: PathBuf,
    pub remote_url: String,
    /// Watched files present at startup.
    pub present: Vec<String>,
    /// Watched files missing at startup (warned, still watched).
    pub missing: Vec<String>,
}

/// Verify the repository side: git available, work tree, remote.
pub async fn check_repository(
    backend: &dyn GitBackend,
    root: &Path,
    remote: &str,
) -> Result<(String, PathBuf, String), PreflightError> {
    let version = backend
        .version()
        .await
        .map_err(PreflightError::GitUnavailable)?;

    let git_dir = backend
        .git_dir()
        .await
        .map_err(|source| PreflightError::NotARepository {
            path: root.to_path_buf(),
            source,
        })?;

    let remote_url = backend
        .remote_url(remote)
        .await
        .map_err(|source| PreflightError::NoRemote {
            remote: remote.to_string(),
            source,
        })?;

    crate::log_event!("preflight", "git setup is correct", "{version}, {remote} -> {remote_url}");
    Ok((version, git_dir, remote_url))
}

/// Split watched files into present and missing; fail when none exist.
pub fn check_files(
    root: &Path,
    files: &[String],
) -> Result<(Vec<String>, Vec<String>), PreflightError> {
    let (present, missing): (Vec<String>, Vec<String>) = files
        .iter()
        .cloned()
        .partition(|file| root.join(file).exists());

    if !present.is_empty() {
        crate::log_event!("preflight", "existing files to monitor", "{}", present.join(", "));
    }
    if !missing.is_empty() {
        tracing::warn!("[preflight] missing files: {}", missing.join(", "));
    }

    if present.is_empty() {
        return Err(PreflightError::NoWatchedFiles {
            files: files.to_vec(),
        });
    }
    Ok((present, missing))
}

/// Run every startup check.
pub async fn run(
    backend: &dyn GitBackend,
    root: &Path,
    remote: &str,
    files: &[String],
) -> Result<PreflightReport, PreflightError> {
    let (git_version, git_dir, remote_url) = check_repository(backend, root, remote).await?;
    let (present, missing) = check_files(root, files)?;

    Ok(PreflightReport {
        git_version,
        git_dir,
        remote_url,
        present,
        missing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::testing::FakeGit;
    use tempfile::TempDir;

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[tokio::test]
    async fn test_preflight_passes_with_one_present_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("plan-data.json"), "{}").unwrap();
        let git = FakeGit::default();

        let report = run(
            &git,
            dir.path(),
            "origin",
            &files(&["plan-data.json", "config.json"]),
        )
        .await
        .unwrap();

        assert_eq!(report.present, vec!["plan-data.json"]);
        assert_eq!(report.missing, vec!["config.json"]);
        assert_eq!(report.remote_url, "https://example.com/origin.git");
    }

    #[tokio::test]
    async fn test_preflight_fails_without_git() {
        let dir = TempDir::new().unwrap();
        let git = FakeGit {
            fail_version: true,
            ..FakeGit::default()
        };

        let err = run(&git, dir.path(), "origin", &files(&["a"])).await.unwrap_err();
        assert!(matches!(err, PreflightError::GitUnavailable(_)));
    }

    #[tokio::test]
    async fn test_preflight_fails_outside_repository() {
        let dir = TempDir::new().unwrap();
        let git = FakeGit {
            not_repo: true,
            ..FakeGit::default()
        };

        let err = run(&git, dir.path(), "origin", &files(&["a"])).await.unwrap_err();
        assert!(matches!(err, PreflightError::NotARepository { .. }));
    }

    #[tokio::test]
    async fn test_preflight_fails_without_remote() {
        let dir = TempDir::new().unwrap();
        let git = FakeGit {
            no_remote: true,
            ..FakeGit::default()
        };

        let err = run(&git, dir.path(), "upstream", &files(&["a"])).await.unwrap_err();
        assert_eq!(err.to_string(), "No remote 'upstream' configured");
    }

    #[test]
    fn test_check_files_fails_when_none_exist() {
        let dir = TempDir::new().unwrap();

        let err = check_files(dir.path(), &files(&["a.json", "b.json"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "None of the watched files exist: a.json, b.json"
        );
    }
}

//! Error types for git subprocess calls.

use thiserror::Error;

/// Errors from running git.
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {operation} exited with {}: {stderr}", exit_label(.code))]
    CommandFailed {
        operation: &'static str,
        code: Option<i32>,
        stderr: String,
    },
}

impl GitError {
    /// Text worth showing to a user: captured stderr, or the error itself.
    pub fn diagnostic(&self) -> String {
        match self {
            GitError::CommandFailed { stderr, .. } if !stderr.is_empty() => stderr.clone(),
            other => other.to_string(),
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

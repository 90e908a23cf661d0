//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module and returns an
//! `anyhow::Result`; `main` turns errors into exit code 1.

pub mod check;
pub mod init;
pub mod push;
pub mod read;
pub mod watch;

use std::sync::Arc;

use crate::config::Settings;
use crate::git::GitCli;

/// Git backend rooted at the configured repository.
fn git_backend(settings: &Settings) -> Arc<GitCli> {
    Arc::new(GitCli::new(&settings.git.program, settings.root()))
}

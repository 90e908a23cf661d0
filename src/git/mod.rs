//! Git operations behind a small trait.
//!
//! # Architecture
//!
//! ```text
//! GitPublisher (stage -> staged diff? -> commit -> push)
//!       |
//!   GitBackend trait
//!       |
//!    GitCli (tokio::process, one subprocess per operation)
//! ```

mod backend;
mod error;
pub mod preflight;
mod publisher;
#[cfg(test)]
pub(crate) mod testing;

pub use backend::{GitBackend, GitCli};
pub use error::GitError;
pub use preflight::{PreflightError, PreflightReport};
pub use publisher::{GitPublisher, PushOutcome};

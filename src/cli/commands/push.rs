//! Push command - publish one file immediately.

use anyhow::bail;

use crate::config::Settings;
use crate::git::{GitPublisher, PushOutcome, preflight};

pub async fn run(settings: &Settings, file: &str, message: Option<&str>) -> anyhow::Result<()> {
    let root = settings.root();
    let backend = super::git_backend(settings);
    preflight::check_repository(backend.as_ref(), &root, &settings.git.remote).await?;

    let publisher = GitPublisher::new(backend, &settings.git);
    let path = root.join(file);
    let outcome = match message {
        Some(message) => publisher.publish(&path, message).await,
        None => publisher.publish_file(&path, file).await,
    };

    println!("{file}: {outcome}");
    if outcome.is_failure() || outcome == PushOutcome::FileMissing {
        bail!("could not publish {file}");
    }
    Ok(())
}

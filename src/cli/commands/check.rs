//! Check command - run the startup checks without watching.

use crate::config::Settings;
use crate::git::preflight::{self, PreflightReport};

/// Validate settings and run preflight against the configured repository.
pub async fn run_preflight(settings: &Settings) -> anyhow::Result<PreflightReport> {
    settings.validate()?;
    let root = settings.root();
    let backend = super::git_backend(settings);

    let report = preflight::run(
        backend.as_ref(),
        &root,
        &settings.git.remote,
        &settings.watch.files,
    )
    .await?;
    Ok(report)
}

pub async fn run(settings: &Settings) -> anyhow::Result<()> {
    let report = run_preflight(settings).await?;

    println!("{}", report.git_version);
    println!("Repository: {}", settings.root().display());
    println!(
        "Remote:     {} -> {}",
        settings.git.remote, report.remote_url
    );
    println!("Branch:     {}", settings.git.branch);
    for file in &report.present {
        println!("  watching  {file}");
    }
    for file in &report.missing {
        println!("  missing   {file}");
    }
    Ok(())
}

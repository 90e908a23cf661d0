//! Init and Config commands.

use std::path::Path;

use anyhow::anyhow;

use crate::config::Settings;

/// Create `.autopush/settings.toml` under `root`.
pub fn run_init(root: &Path, force: bool) -> anyhow::Result<()> {
    let path = Settings::init_config_file(root, force).map_err(|e| anyhow!("{e}"))?;
    println!("Created configuration file at: {}", path.display());
    println!("Edit this file to choose the files to watch.");
    Ok(())
}

/// Print the effective configuration.
pub fn run_config(config: &Settings) -> anyhow::Result<()> {
    println!("Current Configuration:");
    println!("{}", "=".repeat(50));
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

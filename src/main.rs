use std::path::{Path, PathBuf};
use std::process::ExitCode;

use autopush::cli::{Cli, Commands, commands};
use autopush::{Settings, logging};
use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    match run(&cli, &cwd).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_settings(cli: &Cli, cwd: &Path) -> anyhow::Result<Settings> {
    let loaded = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load_in(cwd),
    };
    let mut settings = loaded.map_err(|e| anyhow::anyhow!("Configuration error: {e}"))?;
    if settings.workspace_root.is_none() {
        settings.workspace_root = Some(cwd.to_path_buf());
    }
    Ok(settings)
}

async fn run(cli: &Cli, cwd: &Path) -> anyhow::Result<()> {
    match cli.command() {
        // Writes the config file, so nothing is loaded first
        Commands::Init { force } => commands::init::run_init(cwd, force),

        Commands::Config => commands::init::run_config(&load_settings(cli, cwd)?),

        Commands::Read { file, json } => {
            commands::read::run(&load_settings(cli, cwd)?, &file, json)
        }

        Commands::Check => {
            let settings = load_settings(cli, cwd)?;
            logging::init_with_config(&settings.logging, &settings.root());
            commands::check::run(&settings).await
        }

        Commands::Push { file, message } => {
            let settings = load_settings(cli, cwd)?;
            logging::init_with_config(&settings.logging, &settings.root());
            commands::push::run(&settings, &file, message.as_deref()).await
        }

        Commands::Watch(args) => {
            let mut settings = load_settings(cli, cwd)?;
            commands::watch::apply_overrides(&mut settings, &args);
            logging::init_with_config(&settings.logging, &settings.root());
            commands::watch::run(&settings, commands::watch::shutdown_signal())
                .await
                .map(|_| ())
        }
    }
}

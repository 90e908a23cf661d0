//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

const AFTER_HELP: &str = "\
Quick Start:
  $ autopush init                       # Write .autopush/settings.toml
  $ autopush check                      # Verify git, remote and watched files
  $ autopush                            # Watch the configured files
  $ autopush watch notes.md --delay 10  # Watch one file with a 10s quiet period
  $ autopush push plan-data.json        # Publish one file now";

/// Commit and push watched files as they change
#[derive(Parser, Debug)]
#[command(
    name = "autopush",
    version = env!("CARGO_PKG_VERSION"),
    about = "Commit and push watched files as they change",
    long_about = "Watch a few files in a git work tree. When one of them has been quiet \
                  for the configured period, stage, commit and push it.",
    styles = clap_cargo_style(),
    after_help = AFTER_HELP
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Defaults to `watch` with the configured files
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// The subcommand to run, `watch` when none was given.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or_else(|| Commands::Watch(WatchArgs::default()))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Set up the .autopush directory
    Init {
        /// Overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// Run the startup checks and exit
    Check,

    /// Watch files and publish them as they settle
    Watch(WatchArgs),

    /// Stage, commit and push one file now
    Push {
        /// File to publish, relative to the repository root
        file: String,

        /// Commit message (default: the configured template)
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Decode a file with the configured encodings and print it
    Read {
        /// File to read
        file: PathBuf,

        /// Parse as a JSON object and print its top-level entries
        #[arg(long)]
        json: bool,
    },
}

/// Overrides for a watch session.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct WatchArgs {
    /// Files to watch instead of the configured ones
    pub files: Vec<String>,

    /// Quiet period in seconds before a change is published
    #[arg(short, long, value_name = "SECS")]
    pub delay: Option<f64>,

    /// Poll file contents instead of using filesystem notifications
    #[arg(long)]
    pub poll: bool,

    /// Poll interval in seconds
    #[arg(long, value_name = "SECS")]
    pub interval: Option<f64>,

    /// Remote to push to
    #[arg(long)]
    pub remote: Option<String>,

    /// Branch to push
    #[arg(long)]
    pub branch: Option<String>,
}

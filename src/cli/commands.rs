//! CLI commands implementation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

mod fetch;
mod probe;

use fetch::cmd_fetch;
use probe::cmd_probe;

#[derive(Parser)]
#[command(name = "mirra")]
#[command(about = "Mirror resolution and fallback-fetch tool")]
#[command(version)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the fastest mirror and fetch the resource
    Fetch {
        /// Language tag selecting the mirror list (default: from locale)
        #[arg(short, long)]
        lang: Option<String>,
        /// Write the fetched resource to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Probe all mirrors and report latencies (no fetch)
    Probe {
        /// Language tag selecting the mirror list (default: from locale)
        #[arg(short, long)]
        lang: Option<String>,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Fetch { lang, output } => {
            cmd_fetch(config, lang.as_deref(), output.as_deref()).await
        }
        Commands::Probe { lang } => cmd_probe(config, lang.as_deref()).await,
    }
}

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feedmerge_core::AppConfig;

mod commands;

use commands::run::RunArgs;

#[derive(Parser)]
#[command(name = "feedmerge")]
#[command(author, version, about = "Merge several RSS/Atom feeds into one timeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the config file (defaults to ~/.config/feedmerge/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, merge and print the configured feeds
    Run(RunArgs),
    /// Show the cache key and cache file for a feed URL
    Key {
        /// Feed URL
        url: String,
    },
    /// Delete every cached feed document
    Clean,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    // Logs go to stderr so `run --json` output stays machine-readable
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Some(Commands::Run(args)) => commands::run::run(config, args).await,
        None => commands::run::run(config, RunArgs::default()).await,
        Some(Commands::Key { url }) => commands::cache::key(&config, &url),
        Some(Commands::Clean) => commands::cache::clean(&config).await,
    }
}

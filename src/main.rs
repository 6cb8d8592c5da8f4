//! Social-Tide main entry point
//!
//! This is the command-line interface for the Social-Tide graph agent.

use anyhow::Context;
use clap::{Parser, Subcommand};
use social_tide::config::{load_config_with_hash, Config};
use social_tide::service;
use social_tide::stats::{load_statistics, print_statistics};
use social_tide::storage::SqliteStorage;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Social-Tide: a rate-governed social graph agent
///
/// Social-Tide grows a pool of accounts by crawling followers breadth-first,
/// follows them for a configured window before unfollowing, and likes media
/// found through hashtags. Every request is paced by an adaptive throttle.
#[derive(Parser, Debug)]
#[command(name = "social-tide")]
#[command(version = "1.0.0")]
#[command(about = "A rate-governed social graph agent", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the crawler, follow cycle and like pipeline (default)
    Run,

    /// Create the database, record the seed account and schedule
    /// unfollowing of everyone it follows
    Install,

    /// Schedule unfollowing of everyone the account follows
    Unfollow,

    /// Show graph statistics from the database and exit
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => service::run(config).await.context("run failed")?,
        Command::Install => service::install(config).await.context("install failed")?,
        Command::Unfollow => service::unfollow(config)
            .await
            .context("unfollow failed")?,
        Command::Stats => handle_stats(&config)?,
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("social_tide=info,warn"),
            1 => EnvFilter::new("social_tide=debug,info"),
            2 => EnvFilter::new("social_tide=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the `stats` command: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = SqliteStorage::new(Path::new(&config.storage.database_path))
        .context("failed to open database")?;
    let threshold = chrono::Utc::now() - config.following.follow_window();
    let stats = load_statistics(&storage, threshold)?;
    print_statistics(&stats);

    Ok(())
}

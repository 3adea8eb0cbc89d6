//! Atelier CLI - bounded concurrent image downloads for fashion datasets.
//!
//! Atelier reads scraped product metadata, downloads each product image to a
//! deterministic file name while capping requests per host, and writes a
//! report of every row that could not be fetched.
//!
//! # Usage
//!
//! ```bash
//! # Download every image referenced by a metadata CSV
//! atelier fetch farfetch_women.csv
//!
//! # Re-drive the failures of an earlier run
//! atelier retry ~/.atelier/reports/bad_urls_farfetch_women.csv
//!
//! # View configuration
//! atelier config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Atelier - bounded concurrent image downloads for fashion datasets.
#[derive(Parser, Debug)]
#[command(name = "atelier")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Download the images referenced by a metadata CSV
    Fetch(cli::fetch::FetchArgs),

    /// Retry the failures recorded in a previous report
    Retry(cli::retry::RetryArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match atelier_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `atelier config path`."
            );
            atelier_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Atelier v{}", atelier_core::VERSION);

    match cli.command {
        Commands::Fetch(args) => cli::fetch::execute(args).await,
        Commands::Retry(args) => cli::retry::execute(args).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}

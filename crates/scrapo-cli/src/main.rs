//! Scrapo command-line host.
//!
//! Thin shell over the scanner: loads configuration, opens the dataset
//! store, attaches to the browser when a command needs a page, and prints
//! what happened. Core logic lives in the `crates/` libraries.

mod app;
mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use scrapo_core::{AppConfig, ExtractionType};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "scrapo", version, about = "Scrape paginated listings into CSV")]
struct Cli {
    /// Read configuration from this file instead of the default location
    #[arg(global = true, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape several pages, following the next-page control
    Run {
        /// Layout to extract: accounts or leads
        #[arg(short = 't', long = "type")]
        extraction_type: ExtractionType,
        /// Number of pages to scrape (1-50)
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=50))]
        pages: u32,
        /// Open this URL before starting
        #[arg(long)]
        url: Option<String>,
    },
    /// Scrape the current page into the existing dataset
    Scrape {
        /// Layout to extract: accounts or leads
        #[arg(short = 't', long = "type")]
        extraction_type: ExtractionType,
        /// Open this URL before scraping
        #[arg(long)]
        url: Option<String>,
    },
    /// Write the dataset to a CSV file and clear it
    Export {
        /// Dataset to export: accounts or leads
        #[arg(short = 't', long = "type")]
        extraction_type: ExtractionType,
        /// Keep the dataset after exporting
        #[arg(long)]
        keep: bool,
        /// Directory to write into (defaults to the configured export directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Remove everything accumulated for a dataset
    Clear {
        /// Dataset to clear: accounts or leads
        #[arg(short = 't', long = "type")]
        extraction_type: ExtractionType,
    },
    /// Show how much each dataset holds
    Status,
}

/// Initialize tracing subscriber for logging
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,scrapo=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    info!("Starting Scrapo v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load_with_env(cli.config.as_deref())?;
    let app = app::App::open(config).await?;

    match cli.command {
        Commands::Run {
            extraction_type,
            pages,
            url,
        } => commands::run(&app, extraction_type, pages, url).await?,
        Commands::Scrape {
            extraction_type,
            url,
        } => commands::scrape(&app, extraction_type, url).await?,
        Commands::Export {
            extraction_type,
            keep,
            out,
        } => commands::export(&app, extraction_type, keep, out).await?,
        Commands::Clear { extraction_type } => commands::clear(&app, extraction_type).await?,
        Commands::Status => commands::status(&app).await?,
    }

    Ok(())
}

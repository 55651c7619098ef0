//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest category harvester.

use clap::Parser;
use std::path::PathBuf;
use sumi_harvest::config::{load_config_with_hash, Config};
use sumi_harvest::crawler::harvest;
use sumi_harvest::output::print_summary;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: A polite category harvester
///
/// Sumi-Harvest discovers a site's categories, walks every page of every
/// category under a two-level rate limit, and exports the extracted records
/// per category.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A polite category harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the effective settings without harvesting
    #[arg(long)]
    dry_run: bool,

    /// Override the output directory from the config file
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!(hash = %config_hash, "Configuration loaded successfully");

    if let Some(dir) = cli.output_dir {
        config.output.directory = dir.display().to_string();
    }

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_harvest(config).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
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

/// Handles the --dry-run mode: prints the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Site:");
    println!("  Name: {}", config.site.name);
    if let Some(base_url) = &config.site.base_url {
        println!("  Base URL: {}", base_url);
    }

    let crawler = &config.crawler;
    println!("\nScheduling:");
    println!("  Categories in parallel: {}", crawler.concurrency_outer);
    println!("  Pages in flight per category: {}", crawler.concurrency_inner);
    println!("  Minimum start interval: {}ms", crawler.min_interval_ms);
    println!("  Carryover: {}", crawler.carryover);
    println!(
        "  Retries: {} (delay {}ms)",
        crawler.max_retries, crawler.retry_delay_ms
    );
    println!("  Request timeout: {}ms", crawler.request_timeout_ms);
    println!("  Page size: {}", crawler.page_size);
    if crawler.max_pages > 0 {
        println!("  Max pages per listing: {}", crawler.max_pages);
    }

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Directory: {}", config.output.directory);
    println!("  Formats: {:?}", config.output.formats);

    println!("\n✓ Configuration is valid");
}

/// Runs the harvest until it finishes or Ctrl-C is pressed
async fn handle_harvest(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight pages");
            signal_token.cancel();
        }
    });

    tracing::info!(site = %config.site.name, "Starting harvest");

    match harvest(&config, shutdown).await {
        Ok(summary) => {
            print_summary(&summary);
            if summary.interrupted {
                tracing::warn!("Harvest interrupted, partial results were exported");
            } else {
                tracing::info!("Harvest completed");
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}

//! Catalog-Crawler main entry point
//!
//! This is the command-line interface for the Catalog-Crawler.

use anyhow::Context;
use catalog_crawler::config::{load_config_with_hash, validate, Config};
use catalog_crawler::crawler::crawl;
use catalog_crawler::output::{load_statistics, print_run_summary, print_statistics};
use catalog_crawler::storage::open_storage;
use catalog_crawler::url::listing_page_url;
use catalog_crawler::CrawlError;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Exit status of a run stopped by Ctrl-C
const EXIT_CANCELLED: u8 = 130;

/// Listing URLs shown by --dry-run
const DRY_RUN_PAGES: u32 = 3;

/// Catalog-Crawler: a polite, incremental catalog crawler
///
/// Catalog-Crawler walks the listing pages of a catalog, fetches every new
/// item's detail page and stores it as a structured record, while respecting
/// robots.txt, a shared request quota and spacing between requests.
#[derive(Parser, Debug)]
#[command(name = "catalog-crawler")]
#[command(version = "1.0.0")]
#[command(about = "A polite, incremental catalog crawler", long_about = None)]
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

    /// Validate config and show the first listing pages without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Override the number of listing pages to walk
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    max_pages: Option<u32>,

    /// Fetch every discovered item, even ones already stored
    #[arg(long)]
    no_skip_existing: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    apply_overrides(&mut config, &cli);
    validate(&config).context("Invalid command-line override")?;

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)?;
        Ok(ExitCode::SUCCESS)
    } else if cli.stats {
        handle_stats(&config)?;
        Ok(ExitCode::SUCCESS)
    } else {
        handle_crawl(config, &config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_crawler=info,warn"),
            1 => EnvFilter::new("catalog_crawler=debug,info"),
            2 => EnvFilter::new("catalog_crawler=trace,debug"),
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

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(max_pages) = cli.max_pages {
        tracing::info!(max_pages, "Overriding max-pages from the command line");
        config.crawler.max_pages = max_pages;
    }
    if cli.no_skip_existing {
        config.crawler.skip_existing = false;
    }
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Catalog-Crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Start URL: {}", config.crawler.start_url);
    println!("  Max pages: {}", config.crawler.max_pages);
    println!("  Skip existing: {}", config.crawler.skip_existing);
    println!(
        "  Respect robots.txt: {}",
        config.crawler.respect_access_policy
    );
    println!("  Concurrency limit: {}", config.crawler.concurrency_limit);
    println!("  Minimum spacing: {}ms", config.crawler.min_spacing_ms);

    println!("\nQuota:");
    println!(
        "  {} requests per {}ms window",
        config.quota.capacity, config.quota.window_ms
    );

    println!("\nRetry:");
    println!("  Max retries: {}", config.retry.max_retries);
    println!(
        "  Delay: {}ms doubling up to {}ms, jitter up to {}ms",
        config.retry.base_delay_ms, config.retry.max_delay_ms, config.retry.jitter_ms
    );

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nExtractor:");
    println!("  Strategy: {}", config.extractor.strategy);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nFirst listing pages:");
    for page in 1..=config.crawler.max_pages.min(DRY_RUN_PAGES) {
        let url = listing_page_url(
            &config.crawler.start_url,
            &config.crawler.page_param,
            page,
        )?;
        println!("  {}: {}", page, url);
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    // Open the database
    let storage = open_storage(Path::new(&config.output.database_path))?;

    // Load statistics
    let stats = load_statistics(&storage)?;

    // Print statistics
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str) -> anyhow::Result<ExitCode> {
    tracing::info!(
        "Crawling {} (up to {} listing pages, strategy {})",
        config.crawler.start_url,
        config.crawler.max_pages,
        config.extractor.strategy
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight fetches");
            interrupt.cancel();
        }
    });

    // Run the crawler
    match crawl(config, config_hash, cancel).await {
        Ok(summary) => {
            print_run_summary(&summary);
            if summary.cancelled {
                Ok(ExitCode::from(EXIT_CANCELLED))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Err(e @ CrawlError::DiscoveryFailed { .. }) => {
            tracing::error!("Crawl failed: {}", e);
            eprintln!("Crawl failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

//! Catalog-Relay main entry point
//!
//! This is the operator's command-line interface for a relay job's durable
//! state: inspecting progress, validating configuration, re-arming failed
//! keys and resetting a job. The download/upload pipelines themselves are
//! embedded per data source through the library API.

use catalog_relay::config::load_config_with_hash;
use catalog_relay::pipeline::BatchProgress;
use catalog_relay::FailureKind;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Catalog-Relay: a polite, resumable content-ingestion bot
///
/// Catalog-Relay fetches item records from digital collections while
/// respecting robots.txt and per-host pacing, caches them durably, and
/// republishes them with duplicate detection. Jobs are resumable: all
/// progress lives in plain-text state files this tool inspects and
/// maintains.
#[derive(Parser, Debug)]
#[command(name = "catalog-relay")]
#[command(version = "1.0.0")]
#[command(about = "A polite, resumable content-ingestion bot", long_about = None)]
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

    /// Validate config and show what a run would do without touching state
    #[arg(long, conflicts_with_all = ["retry_failed", "fresh"])]
    dry_run: bool,

    /// Re-arm retryable failed keys so the next run attempts them again
    #[arg(long, conflicts_with_all = ["dry_run", "fresh"])]
    retry_failed: bool,

    /// With --retry-failed: only re-arm validation failures
    #[arg(long, requires = "retry_failed")]
    validation_only: bool,

    /// Reset the job: delete checkpoint and ledgers (cached items are kept)
    #[arg(long, conflicts_with_all = ["dry_run", "retry_failed"])]
    fresh: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, _config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.retry_failed {
        handle_retry_failed(&config, cli.validation_only)?;
    } else if cli.fresh {
        handle_fresh(&config)?;
    } else {
        handle_status(&config)?;
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
            0 => EnvFilter::new("catalog_relay=info,warn"),
            1 => EnvFilter::new("catalog_relay=debug,info"),
            2 => EnvFilter::new("catalog_relay=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows the job setup
fn handle_dry_run(
    config: &catalog_relay::config::Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Catalog-Relay Dry Run ===\n");

    println!("Transport:");
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);
    println!("  Retry limit: {}", config.crawler.retry_limit);
    println!("  Retry backoff unit: {}ms", config.crawler.retry_backoff_ms);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);
    println!("  Header: {}", config.user_agent.header_value());

    println!("\nThrottle:");
    println!("  Default delay: {}s", config.throttle.default_delay_secs);
    println!("  Host overrides ({}):", config.throttle.hosts.len());
    for entry in &config.throttle.hosts {
        println!("    - {} ({}s)", entry.host, entry.delay_secs);
    }

    println!("\nPipeline:");
    println!("  State dir: {}", config.pipeline.state_dir);
    println!("  Cache dir: {}", config.pipeline.cache_dir);
    println!(
        "  Checkpoint interval: every {} item(s)",
        config.pipeline.checkpoint_interval
    );
    println!("  Stop file: {}", config.pipeline.stop_file);
    println!("  Force refresh: {}", config.pipeline.force_refresh);

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the default mode: shows the job's durable state
fn handle_status(
    config: &catalog_relay::config::Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let state_dir = Path::new(&config.pipeline.state_dir);
    println!("State dir: {}\n", config.pipeline.state_dir);

    let checkpoint = match std::fs::read_to_string(state_dir.join("checkpoint")) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => "(none)".to_string(),
    };
    println!("Checkpoint: {}", checkpoint);

    let progress = BatchProgress::load(state_dir)?;
    println!("Succeeded:  {}", progress.succeeded_count());
    println!("Failed:     {}", progress.failed_count());

    if progress.failed_count() > 0 {
        let retryable = progress
            .failed_entries()
            .filter(|(_, reason)| {
                FailureKind::from_reason(reason)
                    .map(FailureKind::is_retryable)
                    .unwrap_or(false)
            })
            .count();
        println!("  of which retryable: {}", retryable);
        println!("\nFailed keys:");
        for (key, reason) in progress.failed_entries() {
            println!("  - {}\t{}", key, reason);
        }
    }

    let stop = Path::new(&config.pipeline.stop_file);
    if stop.exists() {
        println!("\n! Stop file present at {}", config.pipeline.stop_file);
        println!("  The next run will exit immediately; remove it to proceed.");
    }

    Ok(())
}

/// Handles the --retry-failed mode: re-arms retryable failed keys
fn handle_retry_failed(
    config: &catalog_relay::config::Config,
    validation_only: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let state_dir = Path::new(&config.pipeline.state_dir);
    let mut progress = BatchProgress::load(state_dir)?;

    let cleared = progress.clear_failed(validation_only);
    progress.flush()?;

    if validation_only {
        println!("✓ Re-armed {} validation failure(s)", cleared);
    } else {
        println!("✓ Re-armed {} retryable failure(s)", cleared);
    }
    println!("  Remaining failed: {}", progress.failed_count());

    Ok(())
}

/// Handles the --fresh mode: deletes checkpoint and ledgers
///
/// Cached items are deliberately kept; a fresh run will skip re-fetching
/// anything still in the cache.
fn handle_fresh(
    config: &catalog_relay::config::Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let state_dir = Path::new(&config.pipeline.state_dir);

    let mut removed = 0;
    for name in ["checkpoint", "succeeded", "failed"] {
        match std::fs::remove_file(state_dir.join(name)) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    println!("✓ Reset job state ({} file(s) removed)", removed);
    println!("  Cached items were kept; delete the cache dir to re-fetch.");

    Ok(())
}

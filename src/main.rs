//! Corpus-Harvest main entry point
//!
//! This is the command-line interface for one Corpus-Harvest node.

use anyhow::Context;
use clap::Parser;
use corpus_harvest::config::{load_config_with_hash, Config};
use corpus_harvest::crawler::{run_node, Orchestrator};
use corpus_harvest::output::{generate_review_report, load_statistics, print_statistics};
use corpus_harvest::storage::{open_ledger, SqlitePageStore};
use corpus_harvest::{Ledger, MemoryTier};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Corpus-Harvest: resilient crawl orchestration for corpus building
///
/// Each node claims sites from a shared ledger, crawls them through a quality
/// gate and a global deduplication set, and reports the outcome back. Run as
/// many nodes as you like against the same database.
#[derive(Parser, Debug)]
#[command(name = "corpus-harvest")]
#[command(version = "1.0.0")]
#[command(about = "Resilient crawl orchestration for corpus building", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Memory tier this node serves (overrides the config file)
    #[arg(long, value_name = "low|high")]
    tier: Option<MemoryTier>,

    /// Stop after processing this many sites
    #[arg(long, value_name = "N")]
    max_sites: Option<usize>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Register the configured sites in the ledger and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export_review", "reclaim_stale"])]
    seed: bool,

    /// Validate config and show what would be seeded without touching the ledger
    #[arg(long, conflicts_with_all = ["seed", "stats", "export_review", "reclaim_stale"])]
    dry_run: bool,

    /// Show statistics from the ledger and exit
    #[arg(long, conflicts_with_all = ["seed", "dry_run", "export_review", "reclaim_stale"])]
    stats: bool,

    /// Write the markdown review report of flagged and failed sites and exit
    #[arg(long, conflicts_with_all = ["seed", "dry_run", "stats", "reclaim_stale"])]
    export_review: bool,

    /// Return expired claims to the queue and exit
    #[arg(long, conflicts_with_all = ["seed", "dry_run", "stats", "export_review"])]
    reclaim_stale: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(tier) = cli.tier {
        config.node.tier = tier;
    }

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.seed {
        handle_seed(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export_review {
        handle_export_review(&config)?;
    } else if cli.reclaim_stale {
        handle_reclaim_stale(&config)?;
    } else {
        handle_run(&config, cli.max_sites).await?;
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
            0 => EnvFilter::new("corpus_harvest=info,warn"),
            1 => EnvFilter::new("corpus_harvest=debug,info"),
            2 => EnvFilter::new("corpus_harvest=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be seeded
fn handle_dry_run(config: &Config) {
    println!("=== Corpus-Harvest Dry Run ===\n");

    println!("Node:");
    println!("  Id: {}", config.node.resolved_node_id());
    println!("  Tier: {}", config.node.tier);
    println!(
        "  Memory budget: {} MiB",
        config.resilience.memory_budget(config.node.tier) / (1024 * 1024)
    );

    println!("\nQuality Gate:");
    println!("  Max raw bytes: {}", config.gate.max_raw_bytes);
    println!("  Max tokens: {}", config.gate.max_tokens);
    println!("  Min words: {}", config.gate.min_words);

    println!("\nResilience:");
    println!("  Page timeout: {}ms", config.resilience.page_timeout_ms);
    println!("  Site deadline: {}ms", config.resilience.site_deadline_ms);
    println!(
        "  Low-yield threshold: {} pages",
        config.resilience.low_yield_threshold
    );
    println!("  Lease: {}s", config.resilience.lease_secs);

    println!("\nFetcher:");
    println!(
        "  User agent: {}/{} (+{})",
        config.fetcher.crawler_name, config.fetcher.crawler_version, config.fetcher.contact_url
    );
    println!("  Max pages per site: {}", config.fetcher.max_pages_per_site);
    println!("  Follow links: {}", config.fetcher.follow_links);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Review report: {}", config.output.review_path);

    println!("\nSites ({}):", config.sites.len());
    for site in &config.sites {
        println!("  - {} ({} seeds)", site.id, site.seeds.len());
        for seed in &site.seeds {
            println!("    * {}", seed);
        }
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --seed mode: registers configured sites in the ledger
fn handle_seed(config: &Config) -> anyhow::Result<()> {
    let mut ledger = open_ledger(Path::new(&config.output.database_path))
        .context("Failed to open ledger")?;

    let mut registered = 0;
    for site in &config.sites {
        if ledger.register_site(&site.id, &site.seeds)? {
            registered += 1;
        } else {
            tracing::debug!("Site {} already registered", site.id);
        }
    }

    println!(
        "✓ Registered {} new sites ({} already present)",
        registered,
        config.sites.len() - registered
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the ledger
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let db_path = Path::new(&config.output.database_path);
    println!("Database: {}\n", db_path.display());

    let ledger = open_ledger(db_path).context("Failed to open ledger")?;
    let store = SqlitePageStore::new(db_path).context("Failed to open page store")?;

    let stats = load_statistics(&ledger, store.count_documents(None)?)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-review mode: writes the markdown review report
fn handle_export_review(config: &Config) -> anyhow::Result<()> {
    let db_path = Path::new(&config.output.database_path);
    let review_path = Path::new(&config.output.review_path);

    println!("=== Exporting Review Report ===\n");
    println!("Database: {}", db_path.display());
    println!("Output: {}", review_path.display());
    println!();

    let ledger = open_ledger(db_path).context("Failed to open ledger")?;
    let store = SqlitePageStore::new(db_path).context("Failed to open page store")?;
    let stats = load_statistics(&ledger, store.count_documents(None)?)?;

    let orchestrator = Orchestrator::new(
        ledger,
        &config.node.resolved_node_id(),
        &config.resilience,
    );
    let reviews = orchestrator.review_flagged()?;

    tracing::info!("{} sites need review", reviews.len());
    generate_review_report(&reviews, &stats, review_path)
        .with_context(|| format!("Failed to write {}", review_path.display()))?;

    println!("✓ Review report exported to: {}", review_path.display());

    Ok(())
}

/// Handles the --reclaim-stale mode: requeues claims whose lease expired
fn handle_reclaim_stale(config: &Config) -> anyhow::Result<()> {
    let ledger = open_ledger(Path::new(&config.output.database_path))
        .context("Failed to open ledger")?;
    let mut orchestrator = Orchestrator::new(
        ledger,
        &config.node.resolved_node_id(),
        &config.resilience,
    );

    let reclaimed = orchestrator.reclaim_stale()?;
    println!("✓ Reclaimed {} stale claims", reclaimed.len());
    for site_id in &reclaimed {
        println!("  - {}", site_id);
    }

    Ok(())
}

/// Handles the main node loop
async fn handle_run(config: &Config, max_sites: Option<usize>) -> anyhow::Result<()> {
    tracing::info!(
        "Node {} serving {} tier sites",
        config.node.resolved_node_id(),
        config.node.tier
    );

    match run_node(config, max_sites).await {
        Ok(summary) => {
            tracing::info!(
                "Run finished: {} sites, {} pages attempted, {} accepted, {} saved, {} claims lost",
                summary.sites_processed,
                summary.pages_attempted,
                summary.pages_accepted,
                summary.pages_saved,
                summary.claims_lost
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}

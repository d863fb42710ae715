//! Crawler module for site processing
//!
//! This module contains the core crawling logic, including:
//! - Page fetching and content extraction behind swappable traits
//! - The resilience engine (timeouts, memory budget, site deadline)
//! - The per-site worker and its frontier
//! - Site claiming, release and escalation

mod extractor;
mod fetcher;
mod frontier;
mod orchestrator;
mod resilience;
mod worker;

pub use extractor::{Extractor, HtmlExtractor};
pub use fetcher::{build_http_client, FetchError, FetchedPage, Fetcher, HttpFetcher};
pub use frontier::SiteFrontier;
pub use orchestrator::{Orchestrator, RunSummary, SiteReview};
pub use resilience::{MemoryProbe, PageAttempt, PageFailure, ProcessMemory, SiteClock, Supervisor};
pub use worker::{SiteReport, Worker};

use crate::config::Config;
use crate::storage::{open_ledger, SqlitePageStore};
use std::path::Path;

/// Runs this node against the configured ledger until no work is left
///
/// This is the main entry point for a node. It will:
/// 1. Open the shared ledger and the page store
/// 2. Build the HTTP fetcher
/// 3. Claim, process and release sites of the node's tier
///
/// # Arguments
///
/// * `config` - The harvester configuration
/// * `max_sites` - Optional cap on the number of site passes
///
/// # Returns
///
/// * `Ok(RunSummary)` - Totals for the run
/// * `Err(HarvestError)` - An infrastructure failure stopped the node
pub async fn run_node(config: &Config, max_sites: Option<usize>) -> crate::Result<RunSummary> {
    let db_path = Path::new(&config.output.database_path);
    let node_id = config.node.resolved_node_id();

    let ledger = open_ledger(db_path)?;
    let store = SqlitePageStore::new(db_path)?;
    let fetcher = HttpFetcher::new(&config.fetcher, config.gate.max_raw_bytes)?;

    tracing::info!(
        "Starting node {} at {} tier against {}",
        node_id,
        config.node.tier,
        db_path.display()
    );

    let mut worker = Worker::new(&node_id, config, Box::new(fetcher), Box::new(store));
    let mut orchestrator = Orchestrator::new(ledger, &node_id, &config.resilience);

    orchestrator.run(&mut worker, max_sites).await
}

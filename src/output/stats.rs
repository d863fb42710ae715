//! Statistics generation from the ledger
//!
//! This module provides functionality for extracting and displaying
//! fleet-wide harvest statistics from the shared ledger.

use crate::state::SiteStatus;
use crate::storage::{ErrorKind, Ledger};
use std::collections::HashMap;

/// Harvest statistics summary
#[derive(Debug, Clone, Default)]
pub struct HarvestStatistics {
    /// Total number of registered sites
    pub total_sites: u64,

    /// Count of sites by status
    pub sites_by_status: HashMap<SiteStatus, u64>,

    /// Count of error records by kind
    pub errors_by_kind: HashMap<ErrorKind, u64>,

    /// Size of the global content-hash set
    pub unique_hashes: u64,

    /// Pages persisted by the page store
    pub documents_saved: u64,
}

impl HarvestStatistics {
    pub fn count(&self, status: SiteStatus) -> u64 {
        self.sites_by_status.get(&status).copied().unwrap_or(0)
    }

    /// Share of finished sites that completed without review, as a percentage
    pub fn completion_rate(&self) -> f64 {
        let finished: u64 = SiteStatus::all()
            .iter()
            .filter(|s| s.is_terminal())
            .map(|s| self.count(*s))
            .sum();
        if finished == 0 {
            0.0
        } else {
            (self.count(SiteStatus::Completed) as f64 / finished as f64) * 100.0
        }
    }
}

/// Loads statistics from the ledger
///
/// # Arguments
///
/// * `ledger` - The ledger to query
/// * `documents_saved` - Document count reported by the page store
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(
    ledger: &dyn Ledger,
    documents_saved: u64,
) -> crate::Result<HarvestStatistics> {
    let sites_by_status = ledger.status_counts()?;
    let total_sites = sites_by_status.values().sum();

    Ok(HarvestStatistics {
        total_sites,
        sites_by_status,
        errors_by_kind: ledger.error_counts()?,
        unique_hashes: ledger.count_hashes()?,
        documents_saved,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Registered sites: {}", stats.total_sites);
    println!("  Unique content hashes: {}", stats.unique_hashes);
    println!("  Documents saved: {}", stats.documents_saved);
    println!();

    println!("Sites by Status:");
    for status in SiteStatus::all() {
        let count = stats.count(status);
        let percentage = if stats.total_sites > 0 {
            (count as f64 / stats.total_sites as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    if !stats.errors_by_kind.is_empty() {
        println!("Error Records:");
        let mut error_counts: Vec<_> = stats.errors_by_kind.iter().collect();
        error_counts.sort_by(|a, b| b.1.cmp(a.1));

        for (kind, count) in error_counts {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    println!(
        "Completion Rate: {:.1}% of finished sites completed without review",
        stats.completion_rate()
    );
}

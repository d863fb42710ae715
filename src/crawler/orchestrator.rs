//! Crawl orchestrator - claim, process and release sites
//!
//! Each node runs one orchestrator over the shared ledger. The orchestrator owns the
//! site-level policy:
//! - Which sites this node may claim (its memory tier)
//! - How a finished pass maps onto a ledger transition
//! - Escalation of out-of-memory sites to the high tier
//! - Recovery of claims whose owner stopped heartbeating

use crate::config::ResilienceConfig;
use crate::crawler::worker::{SiteReport, Worker};
use crate::state::{MemoryTier, SiteOutcome, SiteStatus};
use crate::storage::{ErrorKind, ErrorRecord, Ledger, SiteRecord, SiteRelease};
use crate::HarvestError;
use std::collections::HashMap;
use std::time::Duration;

/// A site awaiting human review, with everything recorded against it
#[derive(Debug, Clone)]
pub struct SiteReview {
    pub site: SiteRecord,
    pub errors: Vec<ErrorRecord>,
}

/// Totals for one `run` of the orchestrator loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sites_processed: u64,
    pub pages_attempted: u64,
    pub pages_accepted: u64,
    pub pages_saved: u64,
    /// Final ledger status of each released site
    pub released: HashMap<SiteStatus, u64>,
    /// Passes abandoned because another node took the claim
    pub claims_lost: u64,
}

/// Site-level coordinator for one node
pub struct Orchestrator<L: Ledger> {
    ledger: L,
    node_id: String,
    lease: Duration,
    low_yield_threshold: u64,
}

impl<L: Ledger> Orchestrator<L> {
    /// Creates an orchestrator for `node_id` over `ledger`
    pub fn new(ledger: L, node_id: &str, resilience: &ResilienceConfig) -> Self {
        Self {
            ledger,
            node_id: node_id.to_string(),
            lease: resilience.lease(),
            low_yield_threshold: resilience.low_yield_threshold,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// Claims the next unclaimed site assigned to `tier`
    ///
    /// # Returns
    ///
    /// * `Ok(SiteRecord)` - The site, now claimed by this node
    /// * `Err(HarvestError::NoWorkAvailable)` - Nothing claimable at this tier
    pub fn claim_next_site(&mut self, tier: MemoryTier) -> crate::Result<SiteRecord> {
        match self.ledger.claim_next(&self.node_id, tier, self.lease)? {
            Some(site) => {
                tracing::info!(
                    "Node {} claimed site {} (pass {})",
                    self.node_id,
                    site.id,
                    site.pass_count
                );
                Ok(site)
            }
            None => Err(HarvestError::NoWorkAvailable { tier }),
        }
    }

    /// Ends this node's claim on `site` according to the pass report
    ///
    /// | Outcome | Ledger transition |
    /// |---|---|
    /// | Success | `Completed` |
    /// | LowYield | `Flagged`, plus a `LowYield` record |
    /// | OutOfMemory at `Low` | back to `Unclaimed` at `High`, plus an `OutOfMemory` record |
    /// | OutOfMemory at `High` | `Failed`, plus an `OutOfMemory` record |
    ///
    /// Returns the status the site was moved to, or `ClaimLost` if this node no longer held
    /// the claim (in which case nothing is written).
    pub fn release(&mut self, site: &SiteRecord, report: &SiteReport) -> crate::Result<SiteStatus> {
        let outcome = report.outcome(self.low_yield_threshold);
        let tier = site.memory_tier;

        let (status, memory_tier, record) = match outcome {
            SiteOutcome::Success => (SiteStatus::Completed, tier, None),
            SiteOutcome::LowYield => (
                SiteStatus::Flagged,
                tier,
                Some(ErrorRecord::new(
                    &site.id,
                    ErrorKind::LowYield,
                    format!(
                        "{} of {} attempted pages accepted, below threshold {}",
                        report.accepted, report.attempted, self.low_yield_threshold
                    ),
                )),
            ),
            SiteOutcome::OutOfMemory => {
                let detail = report
                    .out_of_memory
                    .clone()
                    .unwrap_or_else(|| "memory exhausted".to_string());
                match tier.escalate() {
                    Some(next) => (
                        SiteStatus::Unclaimed,
                        next,
                        Some(ErrorRecord::new(
                            &site.id,
                            ErrorKind::OutOfMemory,
                            format!("{}; escalating from {} to {} tier", detail, tier, next),
                        )),
                    ),
                    None => (
                        SiteStatus::Failed,
                        tier,
                        Some(ErrorRecord::new(
                            &site.id,
                            ErrorKind::OutOfMemory,
                            format!("{}; no tier above {}", detail, tier),
                        )),
                    ),
                }
            }
        };

        let released = self.ledger.release(
            &site.id,
            &self.node_id,
            SiteRelease {
                status,
                memory_tier,
                attempted_page_count: report.attempted,
                accepted_page_count: report.accepted,
            },
        )?;

        if !released {
            tracing::warn!(
                "Node {} lost its claim on {} before release",
                self.node_id,
                site.id
            );
            return Err(HarvestError::ClaimLost {
                site_id: site.id.clone(),
                node_id: self.node_id.clone(),
            });
        }

        if let Some(record) = record {
            self.ledger.record_error(&record)?;
        }

        tracing::info!(
            "Released site {} as {} ({}, {} tier)",
            site.id,
            status,
            outcome,
            memory_tier
        );

        Ok(status)
    }

    /// Claims and processes sites until none are left for the worker's tier
    ///
    /// Stops after `max_sites` passes when given.
    pub async fn run(
        &mut self,
        worker: &mut Worker,
        max_sites: Option<usize>,
    ) -> crate::Result<RunSummary> {
        let tier = worker.tier();
        let mut summary = RunSummary::default();

        loop {
            if let Some(max) = max_sites {
                if summary.sites_processed as usize >= max {
                    tracing::info!("Reached limit of {} sites", max);
                    break;
                }
            }

            let site = match self.claim_next_site(tier) {
                Ok(site) => site,
                Err(HarvestError::NoWorkAvailable { .. }) => {
                    tracing::info!("No more {} tier sites to claim", tier);
                    break;
                }
                Err(e) => return Err(e),
            };

            let report = worker.process_site(&mut self.ledger, &site).await?;
            summary.sites_processed += 1;
            summary.pages_attempted += report.attempted;
            summary.pages_accepted += report.accepted;
            summary.pages_saved += report.saved;

            if report.claim_lost {
                summary.claims_lost += 1;
                continue;
            }

            match self.release(&site, &report) {
                Ok(status) => *summary.released.entry(status).or_insert(0) += 1,
                Err(HarvestError::ClaimLost { .. }) => summary.claims_lost += 1,
                Err(e) => return Err(e),
            }
        }

        Ok(summary)
    }

    /// Returns expired claims to the queue
    pub fn reclaim_stale(&mut self) -> crate::Result<Vec<String>> {
        let reclaimed = self.ledger.reclaim_stale(self.lease)?;
        for site_id in &reclaimed {
            tracing::warn!("Reclaimed stale claim on site {}", site_id);
        }
        Ok(reclaimed)
    }

    /// Lists flagged and failed sites together with their error records
    pub fn review_flagged(&self) -> crate::Result<Vec<SiteReview>> {
        let mut reviews = Vec::new();
        for status in [SiteStatus::Flagged, SiteStatus::Failed] {
            for site in self.ledger.sites_by_status(status)? {
                let errors = self.ledger.errors_for_site(&site.id)?;
                reviews.push(SiteReview { site, errors });
            }
        }
        Ok(reviews)
    }
}

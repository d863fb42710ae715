//! Site worker - processes one claimed site end to end
//!
//! For each page of the site the worker:
//! - Fetches it under the per-page timeout
//! - Queues same-site links into the frontier
//! - Runs the payload through the quality gate and the global hash set
//! - Saves admitted pages, records page failures, and keeps going
//!
//! Page failures never abort the site. Only memory exhaustion, the site deadline, or a lost
//! claim end a pass early.

use crate::config::{Config, ResilienceConfig};
use crate::crawler::extractor::{Extractor, HtmlExtractor};
use crate::crawler::fetcher::Fetcher;
use crate::crawler::frontier::SiteFrontier;
use crate::crawler::resilience::{MemoryProbe, ProcessMemory, Supervisor};
use crate::dedup::{GateDecision, QualityGate, RejectReason};
use crate::state::{MemoryTier, PageAttemptState, SiteOutcome};
use crate::storage::{
    ErrorKind, ErrorRecord, HashOrigin, Ledger, PageStore, SiteProgress, SiteRecord,
};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use url::Url;

/// What happened during one site pass
#[derive(Debug, Clone, Default)]
pub struct SiteReport {
    pub site_id: String,
    pub pass: u32,
    pub tier: MemoryTier,

    /// Pages whose fetch was attempted
    pub attempted: u64,

    /// Pages admitted by the gate, including ones stored by an earlier pass
    pub accepted: u64,

    /// Pages handed to the page store during this pass
    pub saved: u64,

    pub timeouts: u64,
    pub fetch_errors: u64,

    /// Admitted pages the page store refused
    pub store_errors: u64,

    /// Rejections by reason code
    pub rejected: HashMap<&'static str, u64>,

    /// Set when the pass ended on memory exhaustion
    pub out_of_memory: Option<String>,

    pub deadline_reached: bool,

    /// Another node took the site over; the pass must not be released
    pub claim_lost: bool,

    pub elapsed: Duration,
}

impl SiteReport {
    fn new(site: &SiteRecord) -> Self {
        Self {
            site_id: site.id.clone(),
            pass: site.pass_count,
            tier: site.memory_tier,
            ..Self::default()
        }
    }

    pub fn progress(&self) -> SiteProgress {
        SiteProgress {
            attempted_page_count: self.attempted,
            accepted_page_count: self.accepted,
        }
    }

    /// Classifies the finished pass against the low-yield threshold
    pub fn outcome(&self, low_yield_threshold: u64) -> SiteOutcome {
        SiteOutcome::decide(
            self.out_of_memory.is_some(),
            self.accepted,
            low_yield_threshold,
        )
    }

    pub fn rejected_total(&self) -> u64 {
        self.rejected.values().sum()
    }

    fn reject(&mut self, url: &Url, reason: RejectReason) {
        tracing::debug!("Rejected {}: {}", url, reason);
        *self.rejected.entry(reason.code()).or_insert(0) += 1;
    }
}

/// Knobs the worker reads from configuration
#[derive(Debug, Clone, Copy)]
struct WorkerSettings {
    max_pages_per_site: usize,
    follow_links: bool,
    heartbeat_every_pages: u64,
    heartbeat_interval: Duration,
}

/// The single worker a node runs
pub struct Worker {
    node_id: String,
    tier: MemoryTier,
    settings: WorkerSettings,
    resilience: ResilienceConfig,
    gate: QualityGate,
    supervisor: Supervisor,
    fetcher: Box<dyn Fetcher>,
    extractor: Box<dyn Extractor>,
    store: Box<dyn PageStore>,
}

impl Worker {
    /// Creates a worker for `node_id` at the configured tier
    ///
    /// Uses the HTML extractor and the process memory probe; both can be swapped with
    /// `with_extractor` and `with_memory_probe`.
    pub fn new(
        node_id: &str,
        config: &Config,
        fetcher: Box<dyn Fetcher>,
        store: Box<dyn PageStore>,
    ) -> Self {
        let tier = config.node.tier;
        Self {
            node_id: node_id.to_string(),
            tier,
            settings: WorkerSettings {
                max_pages_per_site: config.fetcher.max_pages_per_site,
                follow_links: config.fetcher.follow_links,
                heartbeat_every_pages: config.resilience.heartbeat_every_pages.max(1),
                heartbeat_interval: config.resilience.heartbeat_interval(),
            },
            resilience: config.resilience.clone(),
            gate: QualityGate::new(config.gate.clone()),
            supervisor: Supervisor::new(&config.resilience, tier, Box::new(ProcessMemory)),
            fetcher,
            extractor: Box::new(HtmlExtractor::new()),
            store,
        }
    }

    pub fn with_extractor(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_memory_probe(mut self, probe: Box<dyn MemoryProbe>) -> Self {
        self.supervisor = Supervisor::new(&self.resilience, self.tier, probe);
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn tier(&self) -> MemoryTier {
        self.tier
    }

    /// Crawls a site this node has claimed
    ///
    /// Ledger and store failures are infrastructure errors and are propagated; the claim
    /// then lapses and the site is picked up again after its lease expires.
    pub async fn process_site<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        site: &SiteRecord,
    ) -> crate::Result<SiteReport> {
        let mut report = SiteReport::new(site);
        let origin = HashOrigin {
            site_id: site.id.clone(),
            pass: site.pass_count,
        };

        let mut frontier = SiteFrontier::new(&site.id, self.settings.max_pages_per_site);
        for seed in &site.seeds {
            if !frontier.push(seed) {
                tracing::warn!("Seed {} is not usable for site {}", seed, site.id);
            }
        }

        tracing::info!(
            "Processing site {} (pass {}, {} tier, {} seeds)",
            site.id,
            site.pass_count,
            site.memory_tier,
            frontier.len()
        );

        let started = Instant::now();
        let clock = self.supervisor.start_site();
        let mut last_beat = Instant::now();
        let mut pages_since_beat = 0;
        // Hashes from earlier passes of this site already counted in this pass
        let mut credited = HashSet::new();

        while let Some(url) = frontier.pop() {
            if clock.expired() {
                tracing::warn!(
                    "Site {} reached its deadline after {} pages",
                    site.id,
                    report.attempted
                );
                report.deadline_reached = true;
                break;
            }

            // The lease must be renewed before the next fetch can outlast it
            if pages_since_beat >= self.settings.heartbeat_every_pages
                || last_beat.elapsed() >= self.settings.heartbeat_interval
            {
                if !ledger.heartbeat(&site.id, &self.node_id, report.progress())? {
                    tracing::warn!("Lost claim on site {}; abandoning pass", site.id);
                    report.claim_lost = true;
                    break;
                }
                last_beat = Instant::now();
                pages_since_beat = 0;
            }

            report.attempted += 1;
            pages_since_beat += 1;
            let attempt = self.supervisor.attempt(self.fetcher.as_ref(), &url).await?;

            match attempt.result {
                Ok(fetched) => {
                    tracing::debug!(
                        "Fetched {} ({} bytes in {}ms)",
                        url,
                        fetched.body.len(),
                        attempt.elapsed.as_millis()
                    );

                    let within_size = self.gate.check_size(fetched.body.len()).is_ok();
                    if self.settings.follow_links && within_size {
                        for link in self.extractor.links(&fetched.body, &fetched.final_url) {
                            frontier.push(link.as_str());
                        }
                    }

                    let decision = self.gate.evaluate(
                        ledger,
                        &origin,
                        url.as_str(),
                        &fetched.body,
                        self.extractor.as_ref(),
                    )?;

                    match decision {
                        GateDecision::Admit(page) => match self.store.save(&page) {
                            Ok(()) => {
                                report.accepted += 1;
                                report.saved += 1;
                            }
                            Err(e) => {
                                tracing::warn!("Failed to store {}: {}", url, e);
                                // Give the content back so a later pass can admit it
                                ledger.remove_hash(&page.content_hash, &origin)?;
                                report.store_errors += 1;
                                ledger.record_error(&ErrorRecord::for_page(
                                    &site.id,
                                    url.as_str(),
                                    ErrorKind::StoreError,
                                    e.to_string(),
                                ))?;
                            }
                        },
                        GateDecision::AlreadyStored { hash } => {
                            if credited.insert(hash.clone()) {
                                tracing::debug!(
                                    "{} already stored by an earlier pass ({})",
                                    url,
                                    hash
                                );
                                report.accepted += 1;
                            } else {
                                report.reject(&url, RejectReason::Duplicate { hash });
                            }
                        }
                        GateDecision::Reject(reason) => report.reject(&url, reason),
                    }
                }
                Err(failure) if failure.is_resource_exhaustion() => {
                    tracing::warn!("Fetcher exhausted memory on {}: {}", url, failure.detail());
                    report.out_of_memory =
                        Some(format!("{} while fetching {}", failure.detail(), url));
                    break;
                }
                Err(failure) => {
                    tracing::info!("Page {} {}: {}", url, attempt.state, failure.detail());
                    if attempt.state == PageAttemptState::TimedOut {
                        report.timeouts += 1;
                    } else {
                        report.fetch_errors += 1;
                    }
                    if let Some(kind) = failure.error_kind() {
                        ledger.record_error(&ErrorRecord::for_page(
                            &site.id,
                            url.as_str(),
                            kind,
                            failure.detail(),
                        ))?;
                    }
                }
            }

            if let Some(resident) = self.supervisor.memory_exceeded() {
                tracing::warn!(
                    "Resident memory {} MiB exceeds the {} tier budget on site {}",
                    resident / (1024 * 1024),
                    self.tier,
                    site.id
                );
                report.out_of_memory = Some(format!(
                    "resident memory {} bytes over {} tier budget",
                    resident, self.tier
                ));
                break;
            }
        }

        // Final progress; also tells us whether the claim survived the last pages
        if !report.claim_lost && !ledger.heartbeat(&site.id, &self.node_id, report.progress())? {
            tracing::warn!("Lost claim on site {} during its last pages", site.id);
            report.claim_lost = true;
        }

        report.elapsed = started.elapsed();

        tracing::info!(
            "Finished site {}: {} attempted, {} accepted, {} rejected, {} timeouts, {} fetch errors, {} store errors",
            site.id,
            report.attempted,
            report.accepted,
            report.rejected_total(),
            report.timeouts,
            report.fetch_errors,
            report.store_errors
        );

        Ok(report)
    }
}

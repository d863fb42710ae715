//! Per-page and per-site failure containment
//!
//! A single page may hang, error or blow up memory; none of that is allowed to take down
//! the node. Every fetch runs under a timeout, the site as a whole runs under a deadline,
//! and resident memory is checked against the tier's budget after each page.

use crate::config::ResilienceConfig;
use crate::crawler::fetcher::{FetchError, FetchedPage, Fetcher};
use crate::state::{MemoryTier, PageAttemptState};
use crate::storage::ErrorKind;
use std::fs;
use std::time::{Duration, Instant};
use url::Url;

/// Why a page attempt produced no payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageFailure {
    /// The fetch outlived the per-page ceiling
    TimedOut { after: Duration },

    /// The fetcher reported an error
    Errored(FetchError),
}

impl PageFailure {
    /// Ledger kind recorded for this failure
    ///
    /// Resource exhaustion is reported once per site by the orchestrator, not per page.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::TimedOut { .. } => Some(ErrorKind::Timeout),
            Self::Errored(FetchError::ResourceExhausted(_)) => None,
            Self::Errored(_) => Some(ErrorKind::FetchError),
        }
    }

    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Self::Errored(FetchError::ResourceExhausted(_)))
    }

    pub fn detail(&self) -> String {
        match self {
            Self::TimedOut { after } => format!("no response after {}ms", after.as_millis()),
            Self::Errored(e) => e.to_string(),
        }
    }
}

/// The settled result of one page attempt
#[derive(Debug)]
pub struct PageAttempt {
    pub state: PageAttemptState,
    pub elapsed: Duration,
    pub result: Result<FetchedPage, PageFailure>,
}

/// Source of the node's resident memory figure
pub trait MemoryProbe: Send + Sync {
    /// Resident set size in bytes, if it can be determined
    fn resident_bytes(&self) -> Option<u64>;
}

/// Reads the current process's resident set from procfs
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessMemory;

impl MemoryProbe for ProcessMemory {
    fn resident_bytes(&self) -> Option<u64> {
        let status = fs::read_to_string("/proc/self/status").ok()?;
        parse_vm_rss(&status)
    }
}

/// Extracts `VmRSS` (reported in kB) from a procfs status file
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

/// Wall-clock budget for one site pass
#[derive(Debug, Clone, Copy)]
pub struct SiteClock {
    started: Instant,
    deadline: Duration,
}

impl SiteClock {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn expired(&self) -> bool {
        self.elapsed() >= self.deadline
    }
}

/// Applies timeouts and memory checks around page work
pub struct Supervisor {
    page_timeout: Duration,
    site_deadline: Duration,
    memory_budget: u64,
    probe: Box<dyn MemoryProbe>,
}

impl Supervisor {
    /// Creates a supervisor for a node of the given tier
    pub fn new(config: &ResilienceConfig, tier: MemoryTier, probe: Box<dyn MemoryProbe>) -> Self {
        Self {
            page_timeout: config.page_timeout(),
            site_deadline: config.site_deadline(),
            memory_budget: config.memory_budget(tier),
            probe,
        }
    }

    pub fn page_timeout(&self) -> Duration {
        self.page_timeout
    }

    pub fn start_site(&self) -> SiteClock {
        SiteClock {
            started: Instant::now(),
            deadline: self.site_deadline,
        }
    }

    /// Fetches one page under the per-page ceiling
    ///
    /// A hung fetch is abandoned when the timeout fires; the returned attempt is always in
    /// a terminal state.
    pub async fn attempt(&self, fetcher: &dyn Fetcher, url: &Url) -> crate::Result<PageAttempt> {
        let state = PageAttemptState::Pending.transition(PageAttemptState::Fetching)?;
        let started = Instant::now();

        let outcome = tokio::time::timeout(self.page_timeout, fetcher.fetch(url)).await;
        let elapsed = started.elapsed();

        let (state, result) = match outcome {
            Ok(Ok(page)) => (state.transition(PageAttemptState::Succeeded)?, Ok(page)),
            Ok(Err(e)) => (
                state.transition(PageAttemptState::Errored)?,
                Err(PageFailure::Errored(e)),
            ),
            Err(_) => (
                state.transition(PageAttemptState::TimedOut)?,
                Err(PageFailure::TimedOut {
                    after: self.page_timeout,
                }),
            ),
        };

        Ok(PageAttempt {
            state,
            elapsed,
            result,
        })
    }

    /// Returns the resident size when it exceeds the tier's budget
    pub fn memory_exceeded(&self) -> Option<u64> {
        self.probe
            .resident_bytes()
            .filter(|&resident| resident > self.memory_budget)
    }
}

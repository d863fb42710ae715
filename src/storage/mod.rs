//! Storage module for the shared site ledger
//!
//! This module owns all durable coordination state:
//! - Site records, claims, leases and page counters
//! - The global content-hash set used for cross-site deduplication
//! - Error records kept for human review
//! - Persistence of admitted pages (the downstream page store)

mod page_store;
mod schema;
mod sqlite;
mod traits;

pub use page_store::SqlitePageStore;
pub use sqlite::{init_database, SqliteLedger};
pub use traits::{Ledger, LedgerError, LedgerResult, PageStore};

use crate::state::{MemoryTier, SiteStatus};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;

/// Opens (or creates) the ledger database at `path`
pub fn open_ledger(path: &Path) -> LedgerResult<SqliteLedger> {
    SqliteLedger::new(path)
}

/// Represents a site in the ledger
#[derive(Debug, Clone)]
pub struct SiteRecord {
    pub id: String,
    pub status: SiteStatus,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub memory_tier: MemoryTier,
    pub accepted_page_count: u64,
    pub attempted_page_count: u64,
    /// Number of times the site has been claimed; identifies the current pass
    pub pass_count: u32,
    pub lease_expirations: u32,
    pub seeds: Vec<String>,
}

/// Transition proposed by the orchestrator when a claim ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteRelease {
    /// `Unclaimed` to re-enqueue, or a terminal status
    pub status: SiteStatus,
    pub memory_tier: MemoryTier,
    pub attempted_page_count: u64,
    pub accepted_page_count: u64,
}

/// Page counters reported with each heartbeat
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiteProgress {
    pub attempted_page_count: u64,
    pub accepted_page_count: u64,
}

/// Which site pass first inserted a content hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashOrigin {
    pub site_id: String,
    pub pass: u32,
}

/// Kind of an error record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    FetchError,
    OutOfMemory,
    LowYield,
    /// An admitted page the page store failed to persist
    StoreError,
}

impl ErrorKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::FetchError => "fetch_error",
            Self::OutOfMemory => "out_of_memory",
            Self::LowYield => "low_yield",
            Self::StoreError => "store_error",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "timeout" => Some(Self::Timeout),
            "fetch_error" => Some(Self::FetchError),
            "out_of_memory" => Some(Self::OutOfMemory),
            "low_yield" => Some(Self::LowYield),
            "store_error" => Some(Self::StoreError),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// A failure kept for later human review
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub site_id: String,
    pub kind: ErrorKind,
    pub timestamp: DateTime<Utc>,
    pub detail: String,
    /// Page URL for page-level records
    pub url: Option<String>,
}

impl ErrorRecord {
    pub fn new(site_id: &str, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            site_id: site_id.to_string(),
            kind,
            timestamp: Utc::now(),
            detail: detail.into(),
            url: None,
        }
    }

    pub fn for_page(site_id: &str, url: &str, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            url: Some(url.to_string()),
            ..Self::new(site_id, kind, detail)
        }
    }
}

/// An admitted, novel page ready for persistence
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub url: String,
    pub site_id: String,
    pub raw_size: usize,
    pub extracted_text: String,
    pub word_count: usize,
    pub content_hash: String,
}

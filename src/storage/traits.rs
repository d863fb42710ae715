//! Ledger traits and error types
//!
//! This module defines the trait interface for coordination backends and for the downstream
//! page store.

use crate::state::{MemoryTier, SiteStatus};
use crate::storage::{
    ErrorKind, ErrorRecord, HashOrigin, Page, SiteProgress, SiteRecord, SiteRelease,
};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Site not found: {0}")]
    SiteNotFound(String),

    #[error("Invalid site transition for {site_id}: {from} -> {to}")]
    InvalidTransition {
        site_id: String,
        from: SiteStatus,
        to: SiteStatus,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Trait for the shared coordination substrate
///
/// Every node holds its own handle to the same underlying store. Claims and hash inserts are
/// the only operations that need to be atomic across handles; implementations must serve each
/// of them as a single conditional update.
pub trait Ledger {
    // ===== Site Registry =====

    /// Registers a site with its seed URLs
    ///
    /// Returns false if the site already exists (seeds are left untouched).
    fn register_site(&mut self, site_id: &str, seeds: &[String]) -> LedgerResult<bool>;

    /// Gets a site by id
    fn get_site(&self, site_id: &str) -> LedgerResult<Option<SiteRecord>>;

    /// Gets all sites in a given status
    fn sites_by_status(&self, status: SiteStatus) -> LedgerResult<Vec<SiteRecord>>;

    // ===== Claims =====

    /// Atomically claims one specific site for `node_id`
    ///
    /// Succeeds only if the site is unclaimed (or its claim went stale) and is assigned to
    /// `tier`. At most one concurrent caller can succeed.
    fn try_claim(
        &mut self,
        site_id: &str,
        node_id: &str,
        tier: MemoryTier,
        lease: Duration,
    ) -> LedgerResult<bool>;

    /// Atomically claims any unclaimed site assigned to `tier`
    fn claim_next(
        &mut self,
        node_id: &str,
        tier: MemoryTier,
        lease: Duration,
    ) -> LedgerResult<Option<SiteRecord>>;

    /// Renews the lease and records progress
    ///
    /// Returns false if `node_id` no longer holds the claim.
    fn heartbeat(
        &mut self,
        site_id: &str,
        node_id: &str,
        progress: SiteProgress,
    ) -> LedgerResult<bool>;

    /// Ends a claim held by `node_id`
    ///
    /// Compare-and-swap on (`status = Claimed`, `claimed_by = node_id`). Returns false when
    /// the claim was lost in the meantime.
    fn release(&mut self, site_id: &str, node_id: &str, release: SiteRelease)
        -> LedgerResult<bool>;

    /// Returns claims whose heartbeat is older than `lease` to `Unclaimed`
    ///
    /// Returns the ids of the sites that were reclaimed.
    fn reclaim_stale(&mut self, lease: Duration) -> LedgerResult<Vec<String>>;

    // ===== Content Hashes =====

    /// Checks whether a content hash has been seen anywhere in the corpus
    fn hash_exists(&self, hash: &str) -> LedgerResult<bool>;

    /// Inserts a content hash if absent
    ///
    /// Returns true only for the first writer of a given hash.
    fn insert_hash(&mut self, hash: &str, origin: &HashOrigin) -> LedgerResult<bool>;

    /// Withdraws a hash inserted by `origin` whose page never reached the store
    ///
    /// Hashes owned by any other site pass are left alone. Returns true if a row was removed.
    fn remove_hash(&mut self, hash: &str, origin: &HashOrigin) -> LedgerResult<bool>;

    /// Gets the site pass that first inserted a hash
    fn hash_origin(&self, hash: &str) -> LedgerResult<Option<HashOrigin>>;

    /// Counts distinct content hashes
    fn count_hashes(&self) -> LedgerResult<u64>;

    // ===== Error Records =====

    /// Appends an error record
    fn record_error(&mut self, record: &ErrorRecord) -> LedgerResult<()>;

    /// Gets all error records for a site, oldest first
    fn errors_for_site(&self, site_id: &str) -> LedgerResult<Vec<ErrorRecord>>;

    // ===== Statistics =====

    /// Counts error records by kind
    fn error_counts(&self) -> LedgerResult<HashMap<ErrorKind, u64>>;

    /// Counts sites by status
    fn status_counts(&self) -> LedgerResult<HashMap<SiteStatus, u64>>;
}

/// Downstream persistence for admitted pages
pub trait PageStore {
    /// Saves an admitted, non-duplicate page
    fn save(&mut self, page: &Page) -> LedgerResult<()>;
}

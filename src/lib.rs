//! Corpus-Harvest: resilient crawl orchestration for corpus building
//!
//! This crate turns a list of sites into a clean, deduplicated, size-bounded text corpus.
//! Many independent nodes share one site ledger; each node runs a single worker that claims a
//! site, fetches its pages, filters them through the quality gate and the global content-hash
//! set, and reports a terminal outcome back to the ledger.

pub mod config;
pub mod crawler;
pub mod dedup;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Corpus-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] storage::LedgerError),

    #[error("No unclaimed site available for {tier} tier")]
    NoWorkAvailable { tier: state::MemoryTier },

    #[error("Claim on site {site_id} is no longer held by node {node_id}")]
    ClaimLost { site_id: String, node_id: String },

    #[error("Site not found: {0}")]
    SiteNotFound(String),

    #[error("Invalid page attempt transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::PageAttemptState,
        to: state::PageAttemptState,
    },

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid site id: {0}")]
    InvalidSiteId(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Corpus-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Orchestrator, Worker};
pub use dedup::{GateDecision, QualityGate, RejectReason};
pub use state::{MemoryTier, PageAttemptState, SiteOutcome, SiteStatus};
pub use storage::{Ledger, SqliteLedger};
pub use url::{normalize_url, site_id_for};

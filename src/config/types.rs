use crate::state::MemoryTier;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Corpus-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    pub fetcher: FetcherConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "site")]
    pub sites: Vec<SiteEntry>,
}

/// Identity of the node running this worker
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeConfig {
    /// Identifier written into `claimed_by`; derived from host and pid when absent
    #[serde(rename = "node-id")]
    pub node_id: Option<String>,

    /// Memory tier this node serves
    #[serde(default)]
    pub tier: MemoryTier,
}

impl NodeConfig {
    /// Returns the configured node id, or `<HOSTNAME>-<pid>`
    pub fn resolved_node_id(&self) -> String {
        match &self.node_id {
            Some(id) => id.clone(),
            None => {
                let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "node".to_string());
                format!("{}-{}", host, std::process::id())
            }
        }
    }
}

/// Quality gate thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    /// Raw payloads larger than this are rejected before extraction
    #[serde(rename = "max-raw-bytes", default = "default_max_raw_bytes")]
    pub max_raw_bytes: usize,

    /// Extracted text is truncated to this many tokens
    #[serde(rename = "max-tokens", default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Pages with fewer words than this are rejected (inclusive minimum)
    #[serde(rename = "min-words", default = "default_min_words")]
    pub min_words: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_raw_bytes: default_max_raw_bytes(),
            max_tokens: default_max_tokens(),
            min_words: default_min_words(),
        }
    }
}

/// Timeout, lease and escalation policy
#[derive(Debug, Clone, Deserialize)]
pub struct ResilienceConfig {
    /// Ceiling on a single page fetch (milliseconds)
    #[serde(rename = "page-timeout-ms", default = "default_page_timeout_ms")]
    pub page_timeout_ms: u64,

    /// Ceiling on a whole site pass (milliseconds)
    #[serde(rename = "site-deadline-ms", default = "default_site_deadline_ms")]
    pub site_deadline_ms: u64,

    /// Sites completing with fewer accepted pages are flagged for review
    #[serde(rename = "low-yield-threshold", default = "default_low_yield_threshold")]
    pub low_yield_threshold: u64,

    /// A claim without a heartbeat for this long may be taken over
    #[serde(rename = "lease-secs", default = "default_lease_secs")]
    pub lease_secs: u64,

    /// Pages between heartbeats; a heartbeat is also sent once a third of the lease has
    /// passed since the last one
    #[serde(rename = "heartbeat-every-pages", default = "default_heartbeat_every_pages")]
    pub heartbeat_every_pages: u64,

    /// Resident memory budget for low-tier nodes (MiB)
    #[serde(rename = "low-tier-memory-mb", default = "default_low_tier_memory_mb")]
    pub low_tier_memory_mb: u64,

    /// Resident memory budget for high-tier nodes (MiB)
    #[serde(rename = "high-tier-memory-mb", default = "default_high_tier_memory_mb")]
    pub high_tier_memory_mb: u64,
}

impl ResilienceConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.page_timeout_ms)
    }

    pub fn site_deadline(&self) -> Duration {
        Duration::from_millis(self.site_deadline_ms)
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    /// Longest a worker waits between heartbeats when pages are slow
    pub fn heartbeat_interval(&self) -> Duration {
        self.lease() / 3
    }

    /// Memory budget in bytes for the given tier
    pub fn memory_budget(&self, tier: MemoryTier) -> u64 {
        let mb = match tier {
            MemoryTier::Low => self.low_tier_memory_mb,
            MemoryTier::High => self.high_tier_memory_mb,
        };
        mb * 1024 * 1024
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            page_timeout_ms: default_page_timeout_ms(),
            site_deadline_ms: default_site_deadline_ms(),
            low_yield_threshold: default_low_yield_threshold(),
            lease_secs: default_lease_secs(),
            heartbeat_every_pages: default_heartbeat_every_pages(),
            low_tier_memory_mb: default_low_tier_memory_mb(),
            high_tier_memory_mb: default_high_tier_memory_mb(),
        }
    }
}

/// HTTP fetcher identification and per-site page cap
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Maximum number of pages attempted per site pass
    #[serde(rename = "max-pages-per-site", default = "default_max_pages_per_site")]
    pub max_pages_per_site: usize,

    /// Whether same-host links found on fetched pages join the site frontier
    #[serde(rename = "follow-links", default = "default_follow_links")]
    pub follow_links: bool,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite ledger shared by all nodes
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the markdown review report
    #[serde(rename = "review-path")]
    pub review_path: String,
}

/// A site to register in the ledger, with its seed URLs
#[derive(Debug, Clone, Deserialize)]
pub struct SiteEntry {
    /// Canonical host (e.g., "docs.example.com")
    pub id: String,

    /// URLs the site pass starts from
    pub seeds: Vec<String>,
}

fn default_max_raw_bytes() -> usize {
    1024 * 1024
}

fn default_max_tokens() -> usize {
    7_000
}

fn default_min_words() -> usize {
    75
}

fn default_page_timeout_ms() -> u64 {
    120_000
}

fn default_site_deadline_ms() -> u64 {
    6 * 60 * 60 * 1000
}

fn default_low_yield_threshold() -> u64 {
    500
}

fn default_lease_secs() -> u64 {
    900
}

fn default_heartbeat_every_pages() -> u64 {
    5
}

fn default_low_tier_memory_mb() -> u64 {
    1024
}

fn default_high_tier_memory_mb() -> u64 {
    8192
}

fn default_max_pages_per_site() -> usize {
    5_000
}

fn default_follow_links() -> bool {
    true
}

use crate::config::types::{
    Config, FetcherConfig, GateConfig, NodeConfig, OutputConfig, ResilienceConfig, SiteEntry,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_node_config(&config.node)?;
    validate_gate_config(&config.gate)?;
    validate_resilience_config(&config.resilience)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_output_config(&config.output)?;
    validate_sites(&config.sites)?;
    Ok(())
}

fn validate_node_config(config: &NodeConfig) -> Result<(), ConfigError> {
    if let Some(id) = &config.node_id {
        if id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "node_id cannot be empty when set".to_string(),
            ));
        }
    }
    Ok(())
}

/// Validates quality gate thresholds
fn validate_gate_config(config: &GateConfig) -> Result<(), ConfigError> {
    if config.max_raw_bytes == 0 {
        return Err(ConfigError::Validation(
            "max_raw_bytes must be >= 1".to_string(),
        ));
    }

    if config.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "max_tokens must be >= 1".to_string(),
        ));
    }

    if config.min_words == 0 {
        return Err(ConfigError::Validation(
            "min_words must be >= 1".to_string(),
        ));
    }

    // A page truncated to max_tokens could never pass the word check otherwise
    if config.min_words > config.max_tokens {
        return Err(ConfigError::Validation(format!(
            "min_words ({}) cannot exceed max_tokens ({})",
            config.min_words, config.max_tokens
        )));
    }

    Ok(())
}

/// Validates timeout, lease and memory settings
fn validate_resilience_config(config: &ResilienceConfig) -> Result<(), ConfigError> {
    if config.page_timeout_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "page_timeout_ms must be >= 10ms, got {}ms",
            config.page_timeout_ms
        )));
    }

    if config.site_deadline_ms < config.page_timeout_ms {
        return Err(ConfigError::Validation(format!(
            "site_deadline_ms ({}) must be >= page_timeout_ms ({})",
            config.site_deadline_ms, config.page_timeout_ms
        )));
    }

    if config.lease_secs == 0 {
        return Err(ConfigError::Validation("lease_secs must be >= 1".to_string()));
    }

    if config.heartbeat_every_pages == 0 {
        return Err(ConfigError::Validation(
            "heartbeat_every_pages must be >= 1".to_string(),
        ));
    }

    let lease_ms = config.lease_secs.saturating_mul(1000);
    if config.page_timeout_ms >= lease_ms {
        return Err(ConfigError::Validation(format!(
            "page_timeout_ms ({}) must be below the lease ({}s)",
            config.page_timeout_ms, config.lease_secs
        )));
    }

    // Slowest possible gap between page-count heartbeats must fit inside the lease
    if config
        .page_timeout_ms
        .saturating_mul(config.heartbeat_every_pages)
        >= lease_ms
    {
        return Err(ConfigError::Validation(format!(
            "heartbeat_every_pages ({}) x page_timeout_ms ({}) must be below the lease ({}s)",
            config.heartbeat_every_pages, config.page_timeout_ms, config.lease_secs
        )));
    }

    if config.low_tier_memory_mb == 0 || config.high_tier_memory_mb == 0 {
        return Err(ConfigError::Validation(
            "tier memory budgets must be >= 1 MiB".to_string(),
        ));
    }

    if config.high_tier_memory_mb <= config.low_tier_memory_mb {
        return Err(ConfigError::Validation(format!(
            "high_tier_memory_mb ({}) must exceed low_tier_memory_mb ({})",
            config.high_tier_memory_mb, config.low_tier_memory_mb
        )));
    }

    Ok(())
}

/// Validates fetcher identification
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    if config.max_pages_per_site == 0 {
        return Err(ConfigError::Validation(
            "max_pages_per_site must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.review_path.is_empty() {
        return Err(ConfigError::Validation(
            "review_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates site entries: unique ids, seeds that belong to the site
fn validate_sites(sites: &[SiteEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in sites {
        validate_site_id(&entry.id)?;

        if !seen.insert(entry.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Site '{}' is listed more than once",
                entry.id
            )));
        }

        if entry.seeds.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Site '{}' must have at least one seed URL",
                entry.id
            )));
        }

        for seed in &entry.seeds {
            let url = Url::parse(seed).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e))
            })?;

            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::Validation(format!(
                    "Seed URL '{}' must use HTTP or HTTPS",
                    seed
                )));
            }

            let host = url.host_str().map(|h| h.to_lowercase());
            if host.as_deref() != Some(entry.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Seed URL '{}' does not belong to site '{}'",
                    seed, entry.id
                )));
            }
        }
    }

    Ok(())
}

/// Validates a canonical host identifier
fn validate_site_id(id: &str) -> Result<(), ConfigError> {
    if id.is_empty() {
        return Err(ConfigError::InvalidSiteId(
            "Site id cannot be empty".to_string(),
        ));
    }

    if id != id.to_lowercase() {
        return Err(ConfigError::InvalidSiteId(format!(
            "Site id '{}' must be lowercase",
            id
        )));
    }

    // Check for invalid characters
    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidSiteId(format!(
            "Site id '{}' contains invalid characters",
            id
        )));
    }

    if id.starts_with('.') || id.ends_with('.') || id.starts_with('-') || id.ends_with('-') {
        return Err(ConfigError::InvalidSiteId(format!(
            "Site id '{}' cannot start or end with '.' or '-'",
            id
        )));
    }

    if id.contains("..") {
        return Err(ConfigError::InvalidSiteId(format!(
            "Site id '{}' cannot contain consecutive dots",
            id
        )));
    }

    Ok(())
}

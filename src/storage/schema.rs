//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Corpus-Harvest ledger.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per crawl target
CREATE TABLE IF NOT EXISTS sites (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    claimed_by TEXT,
    claimed_at TEXT,
    heartbeat_at TEXT,
    memory_tier TEXT NOT NULL DEFAULT 'low',
    accepted_pages INTEGER NOT NULL DEFAULT 0,
    attempted_pages INTEGER NOT NULL DEFAULT 0,
    pass_count INTEGER NOT NULL DEFAULT 0,
    lease_expirations INTEGER NOT NULL DEFAULT 0,
    registered_at TEXT NOT NULL,
    finished_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_sites_claimable ON sites(status, memory_tier);

-- Seed URLs a site pass starts from
CREATE TABLE IF NOT EXISTS site_seeds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id TEXT NOT NULL REFERENCES sites(id),
    url TEXT NOT NULL,
    UNIQUE(site_id, url)
);

-- Global content-hash set (first writer wins)
CREATE TABLE IF NOT EXISTS content_hashes (
    hash TEXT PRIMARY KEY,
    site_id TEXT NOT NULL,
    pass INTEGER NOT NULL,
    first_seen_at TEXT NOT NULL
);

-- Failures kept for human review
CREATE TABLE IF NOT EXISTS error_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    url TEXT,
    detail TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_error_records_site ON error_records(site_id);

-- Admitted pages
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    site_id TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    raw_size INTEGER NOT NULL,
    word_count INTEGER NOT NULL,
    text TEXT NOT NULL,
    saved_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_site ON documents(site_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

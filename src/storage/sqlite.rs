//! SQLite ledger implementation
//!
//! This module provides a SQLite-based implementation of the Ledger trait. Every node opens
//! its own connection to the same database file; WAL mode plus `BEGIN IMMEDIATE` transactions
//! make each claim a single serialized conditional update.

use crate::state::{MemoryTier, SiteStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Ledger, LedgerError, LedgerResult};
use crate::storage::{
    ErrorKind, ErrorRecord, HashOrigin, SiteProgress, SiteRecord, SiteRelease,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// A low-tier claim that expires this many times is treated as a silent OOM kill
const LEASE_EXPIRATIONS_BEFORE_ESCALATION: u32 = 2;

/// How long a connection waits for another node's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const SITE_COLUMNS: &str = "id, status, claimed_by, claimed_at, heartbeat_at, memory_tier,
     accepted_pages, attempted_pages, pass_count, lease_expirations";

/// SQLite ledger backend
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    /// Creates a new SqliteLedger instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteLedger)` - Successfully opened/created database
    /// * `Err(LedgerError)` - Failed to open database
    pub fn new(path: &Path) -> LedgerResult<Self> {
        let conn = init_database(path)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn load_seeds(conn: &Connection, site_id: &str) -> LedgerResult<Vec<String>> {
        let mut stmt =
            conn.prepare("SELECT url FROM site_seeds WHERE site_id = ?1 ORDER BY id")?;
        let seeds = stmt
            .query_map(params![site_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(seeds)
    }

    fn load_site(conn: &Connection, site_id: &str) -> LedgerResult<Option<SiteRecord>> {
        let sql = format!("SELECT {} FROM sites WHERE id = ?1", SITE_COLUMNS);
        let site = conn
            .query_row(&sql, params![site_id], map_site_row)
            .optional()?;

        match site {
            Some(mut site) => {
                site.seeds = Self::load_seeds(conn, site_id)?;
                Ok(Some(site))
            }
            None => Ok(None),
        }
    }

    /// Claims `site_id` inside an open transaction
    fn claim_in(
        conn: &Connection,
        site_id: &str,
        node_id: &str,
        tier: MemoryTier,
    ) -> LedgerResult<bool> {
        let now = timestamp(Utc::now());
        let changed = conn.execute(
            "UPDATE sites SET status = ?1, claimed_by = ?2, claimed_at = ?3, heartbeat_at = ?3,
             pass_count = pass_count + 1, accepted_pages = 0, attempted_pages = 0,
             finished_at = NULL
             WHERE id = ?4 AND status = ?5 AND memory_tier = ?6",
            params![
                SiteStatus::Claimed.to_db_string(),
                node_id,
                now,
                site_id,
                SiteStatus::Unclaimed.to_db_string(),
                tier.to_db_string()
            ],
        )?;
        Ok(changed == 1)
    }
}

/// Returns stale claims to `Unclaimed` inside an open transaction
///
/// A low-tier site whose lease has expired repeatedly is moved to the high tier and gets an
/// out-of-memory error record, since a node that dies without releasing is most often an
/// OOM kill.
fn expire_stale(conn: &Connection, lease: Duration) -> LedgerResult<Vec<String>> {
    let lease = chrono::Duration::from_std(lease)
        .map_err(|e| LedgerError::Database(format!("lease out of range: {}", e)))?;
    let now = Utc::now();
    let cutoff = timestamp(now - lease);

    let mut stmt = conn.prepare(
        "SELECT id, memory_tier, claimed_by, lease_expirations FROM sites
         WHERE status = ?1 AND heartbeat_at < ?2",
    )?;
    let stale: Vec<(String, String, Option<String>, u32)> = stmt
        .query_map(params![SiteStatus::Claimed.to_db_string(), cutoff], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut reclaimed = Vec::with_capacity(stale.len());

    for (site_id, tier, claimed_by, expirations) in stale {
        let tier = MemoryTier::from_db_string(&tier).unwrap_or_default();
        let expirations = expirations + 1;
        let escalated = match tier.escalate() {
            Some(next) if expirations >= LEASE_EXPIRATIONS_BEFORE_ESCALATION => Some(next),
            _ => None,
        };
        let new_tier = escalated.unwrap_or(tier);

        let changed = conn.execute(
            "UPDATE sites SET status = ?1, claimed_by = NULL, claimed_at = NULL,
             heartbeat_at = NULL, memory_tier = ?2, lease_expirations = ?3
             WHERE id = ?4 AND status = ?5 AND heartbeat_at < ?6",
            params![
                SiteStatus::Unclaimed.to_db_string(),
                new_tier.to_db_string(),
                expirations,
                site_id,
                SiteStatus::Claimed.to_db_string(),
                cutoff
            ],
        )?;

        if changed == 0 {
            continue;
        }

        tracing::warn!(
            site = %site_id,
            node = claimed_by.as_deref().unwrap_or("?"),
            expirations,
            "Lease expired, site returned to {} tier queue",
            new_tier
        );

        if escalated.is_some() {
            let record = ErrorRecord::new(
                &site_id,
                ErrorKind::OutOfMemory,
                format!(
                    "lease expired {} times on {} tier; presumed killed, escalated to {}",
                    expirations, tier, new_tier
                ),
            );
            insert_error(conn, &record)?;
        }

        reclaimed.push(site_id);
    }

    Ok(reclaimed)
}

fn insert_error(conn: &Connection, record: &ErrorRecord) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO error_records (site_id, kind, url, detail, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.site_id,
            record.kind.to_db_string(),
            record.url,
            record.detail,
            timestamp(record.timestamp)
        ],
    )?;
    Ok(())
}

impl Ledger for SqliteLedger {
    // ===== Site Registry =====

    fn register_site(&mut self, site_id: &str, seeds: &[String]) -> LedgerResult<bool> {
        let tx = self.conn.transaction()?;
        let now = timestamp(Utc::now());

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO sites (id, status, memory_tier, registered_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                site_id,
                SiteStatus::Unclaimed.to_db_string(),
                MemoryTier::Low.to_db_string(),
                now
            ],
        )?;

        if inserted == 1 {
            for seed in seeds {
                tx.execute(
                    "INSERT OR IGNORE INTO site_seeds (site_id, url) VALUES (?1, ?2)",
                    params![site_id, seed],
                )?;
            }
        }

        tx.commit()?;
        Ok(inserted == 1)
    }

    fn get_site(&self, site_id: &str) -> LedgerResult<Option<SiteRecord>> {
        Self::load_site(&self.conn, site_id)
    }

    fn sites_by_status(&self, status: SiteStatus) -> LedgerResult<Vec<SiteRecord>> {
        let sql = format!(
            "SELECT {} FROM sites WHERE status = ?1 ORDER BY id",
            SITE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut sites = stmt
            .query_map(params![status.to_db_string()], map_site_row)?
            .collect::<Result<Vec<_>, _>>()?;

        for site in &mut sites {
            site.seeds = Self::load_seeds(&self.conn, &site.id)?;
        }

        Ok(sites)
    }

    // ===== Claims =====

    fn try_claim(
        &mut self,
        site_id: &str,
        node_id: &str,
        tier: MemoryTier,
        lease: Duration,
    ) -> LedgerResult<bool> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        expire_stale(&tx, lease)?;
        let claimed = Self::claim_in(&tx, site_id, node_id, tier)?;
        tx.commit()?;
        Ok(claimed)
    }

    fn claim_next(
        &mut self,
        node_id: &str,
        tier: MemoryTier,
        lease: Duration,
    ) -> LedgerResult<Option<SiteRecord>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        expire_stale(&tx, lease)?;

        let candidate: Option<String> = tx
            .query_row(
                "SELECT id FROM sites WHERE status = ?1 AND memory_tier = ?2
                 ORDER BY registered_at, id LIMIT 1",
                params![SiteStatus::Unclaimed.to_db_string(), tier.to_db_string()],
                |row| row.get(0),
            )
            .optional()?;

        let site = match candidate {
            Some(site_id) if Self::claim_in(&tx, &site_id, node_id, tier)? => {
                Self::load_site(&tx, &site_id)?
            }
            _ => None,
        };

        tx.commit()?;
        Ok(site)
    }

    fn heartbeat(
        &mut self,
        site_id: &str,
        node_id: &str,
        progress: SiteProgress,
    ) -> LedgerResult<bool> {
        let now = timestamp(Utc::now());
        let changed = self.conn.execute(
            "UPDATE sites SET heartbeat_at = ?1, attempted_pages = ?2, accepted_pages = ?3
             WHERE id = ?4 AND status = ?5 AND claimed_by = ?6",
            params![
                now,
                progress.attempted_page_count as i64,
                progress.accepted_page_count as i64,
                site_id,
                SiteStatus::Claimed.to_db_string(),
                node_id
            ],
        )?;
        Ok(changed == 1)
    }

    fn release(
        &mut self,
        site_id: &str,
        node_id: &str,
        release: SiteRelease,
    ) -> LedgerResult<bool> {
        if !SiteStatus::Claimed.can_transition_to(release.status) {
            return Err(LedgerError::InvalidTransition {
                site_id: site_id.to_string(),
                from: SiteStatus::Claimed,
                to: release.status,
            });
        }

        let requeue = release.status == SiteStatus::Unclaimed;
        let finished_at = if requeue {
            None
        } else {
            Some(timestamp(Utc::now()))
        };

        let changed = self.conn.execute(
            "UPDATE sites SET status = ?1, memory_tier = ?2, attempted_pages = ?3,
             accepted_pages = ?4,
             claimed_by = CASE WHEN ?5 THEN NULL ELSE claimed_by END,
             claimed_at = CASE WHEN ?5 THEN NULL ELSE claimed_at END,
             heartbeat_at = CASE WHEN ?5 THEN NULL ELSE heartbeat_at END,
             finished_at = ?6
             WHERE id = ?7 AND status = ?8 AND claimed_by = ?9",
            params![
                release.status.to_db_string(),
                release.memory_tier.to_db_string(),
                release.attempted_page_count as i64,
                release.accepted_page_count as i64,
                requeue,
                finished_at,
                site_id,
                SiteStatus::Claimed.to_db_string(),
                node_id
            ],
        )?;

        Ok(changed == 1)
    }

    fn reclaim_stale(&mut self, lease: Duration) -> LedgerResult<Vec<String>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let reclaimed = expire_stale(&tx, lease)?;
        tx.commit()?;
        Ok(reclaimed)
    }

    // ===== Content Hashes =====

    fn hash_exists(&self, hash: &str) -> LedgerResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM content_hashes WHERE hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_hash(&mut self, hash: &str, origin: &HashOrigin) -> LedgerResult<bool> {
        let now = timestamp(Utc::now());
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO content_hashes (hash, site_id, pass, first_seen_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![hash, origin.site_id, origin.pass, now],
        )?;
        Ok(inserted == 1)
    }

    fn remove_hash(&mut self, hash: &str, origin: &HashOrigin) -> LedgerResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM content_hashes WHERE hash = ?1 AND site_id = ?2 AND pass = ?3",
            params![hash, origin.site_id, origin.pass],
        )?;
        Ok(removed == 1)
    }

    fn hash_origin(&self, hash: &str) -> LedgerResult<Option<HashOrigin>> {
        let origin = self
            .conn
            .query_row(
                "SELECT site_id, pass FROM content_hashes WHERE hash = ?1",
                params![hash],
                |row| {
                    Ok(HashOrigin {
                        site_id: row.get(0)?,
                        pass: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(origin)
    }

    fn count_hashes(&self) -> LedgerResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM content_hashes", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Error Records =====

    fn record_error(&mut self, record: &ErrorRecord) -> LedgerResult<()> {
        insert_error(&self.conn, record)
    }

    fn errors_for_site(&self, site_id: &str) -> LedgerResult<Vec<ErrorRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT site_id, kind, url, detail, recorded_at FROM error_records
             WHERE site_id = ?1 ORDER BY id",
        )?;

        let records = stmt
            .query_map(params![site_id], |row| {
                let kind: String = row.get(1)?;
                let recorded_at: String = row.get(4)?;
                Ok(ErrorRecord {
                    site_id: row.get(0)?,
                    kind: ErrorKind::from_db_string(&kind)
                        .ok_or_else(|| invalid_column(1, format!("unknown kind '{}'", kind)))?,
                    url: row.get(2)?,
                    detail: row.get(3)?,
                    timestamp: parse_timestamp(4, &recorded_at)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    // ===== Statistics =====

    fn error_counts(&self) -> LedgerResult<HashMap<ErrorKind, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT kind, COUNT(*) FROM error_records GROUP BY kind")?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (kind, count) = row?;
            if let Some(kind) = ErrorKind::from_db_string(&kind) {
                counts.insert(kind, count as u64);
            }
        }

        Ok(counts)
    }

    fn status_counts(&self) -> LedgerResult<HashMap<SiteStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM sites GROUP BY status")?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status, count) = row?;
            if let Some(status) = SiteStatus::from_db_string(&status) {
                counts.insert(status, count as u64);
            }
        }

        Ok(counts)
    }
}

fn map_site_row(row: &Row<'_>) -> rusqlite::Result<SiteRecord> {
    let status: String = row.get(1)?;
    let tier: String = row.get(5)?;
    let claimed_at: Option<String> = row.get(3)?;
    let heartbeat_at: Option<String> = row.get(4)?;

    Ok(SiteRecord {
        id: row.get(0)?,
        status: SiteStatus::from_db_string(&status)
            .ok_or_else(|| invalid_column(1, format!("unknown status '{}'", status)))?,
        claimed_by: row.get(2)?,
        claimed_at: claimed_at.map(|s| parse_timestamp(3, &s)).transpose()?,
        heartbeat_at: heartbeat_at.map(|s| parse_timestamp(4, &s)).transpose()?,
        memory_tier: MemoryTier::from_db_string(&tier)
            .ok_or_else(|| invalid_column(5, format!("unknown tier '{}'", tier)))?,
        accepted_page_count: row.get::<_, i64>(6)? as u64,
        attempted_page_count: row.get::<_, i64>(7)? as u64,
        pass_count: row.get(8)?,
        lease_expirations: row.get(9)?,
        seeds: Vec::new(),
    })
}

/// Fixed-width UTC timestamps so that string comparison orders them correctly
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn invalid_column(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

/// Opens a database file with the pragmas every node must share
pub fn init_database(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;

    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
    ",
    )?;

    initialize_schema(&conn)?;

    Ok(conn)
}

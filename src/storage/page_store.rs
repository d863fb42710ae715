//! SQLite page store
//!
//! Persists admitted pages into the `documents` table of the ledger database, where the
//! downstream indexing pipeline picks them up.

use crate::storage::sqlite::init_database;
use crate::storage::traits::{LedgerResult, PageStore};
use crate::storage::Page;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;

/// Page store writing to the shared database file
pub struct SqlitePageStore {
    conn: Connection,
}

impl SqlitePageStore {
    pub fn new(path: &Path) -> LedgerResult<Self> {
        let conn = init_database(path)?;
        Ok(Self { conn })
    }

    /// Counts saved documents, optionally for one site
    pub fn count_documents(&self, site_id: Option<&str>) -> LedgerResult<u64> {
        let count: i64 = match site_id {
            Some(site_id) => self.conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE site_id = ?1",
                params![site_id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }
}

impl PageStore for SqlitePageStore {
    fn save(&mut self, page: &Page) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO documents
             (url, site_id, content_hash, raw_size, word_count, text, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                page.url,
                page.site_id,
                page.content_hash,
                page.raw_size as i64,
                page.word_count as i64,
                page.extracted_text,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

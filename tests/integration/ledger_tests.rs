//! Concurrency tests for the shared ledger
//!
//! Threads stand in for nodes; each opens its own connection to the same database file.

use corpus_harvest::storage::HashOrigin;
use corpus_harvest::{Ledger, MemoryTier, SqliteLedger};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

const LEASE: Duration = Duration::from_secs(900);
const NODES: usize = 8;

fn seeded_db(dir: &Path, sites: usize) -> PathBuf {
    let db = dir.join("ledger.db");
    let mut ledger = SqliteLedger::new(&db).unwrap();
    for n in 0..sites {
        let site = format!("site{}.example.com", n);
        ledger
            .register_site(&site, &[format!("https://{}/", site)])
            .unwrap();
    }
    db
}

/// Runs `f` on `NODES` threads released together, each with its own connection
fn race<T, F>(db: &Path, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize, &mut SqliteLedger) -> T + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let barrier = Arc::new(Barrier::new(NODES));

    let handles: Vec<_> = (0..NODES)
        .map(|i| {
            let db = db.to_path_buf();
            let f = Arc::clone(&f);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut ledger = SqliteLedger::new(&db).unwrap();
                barrier.wait();
                f(i, &mut ledger)
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_concurrent_try_claim_has_one_winner() {
    let dir = tempdir().unwrap();
    let db = seeded_db(dir.path(), 1);

    let results = race(&db, |i, ledger| {
        ledger
            .try_claim("site0.example.com", &format!("node-{}", i), MemoryTier::Low, LEASE)
            .unwrap()
    });

    assert_eq!(results.iter().filter(|won| **won).count(), 1);

    let ledger = SqliteLedger::new(&db).unwrap();
    let site = ledger.get_site("site0.example.com").unwrap().unwrap();
    assert_eq!(site.pass_count, 1);
    assert!(site.claimed_by.unwrap().starts_with("node-"));
}

#[test]
fn test_concurrent_claim_next_never_double_assigns() {
    let dir = tempdir().unwrap();
    let db = seeded_db(dir.path(), 40);

    let claimed = race(&db, |i, ledger| {
        let node = format!("node-{}", i);
        let mut mine = Vec::new();
        while let Some(site) = ledger.claim_next(&node, MemoryTier::Low, LEASE).unwrap() {
            assert_eq!(site.claimed_by.as_deref(), Some(node.as_str()));
            mine.push(site.id);
        }
        mine
    });

    let all: Vec<String> = claimed.into_iter().flatten().collect();
    let distinct: HashSet<_> = all.iter().cloned().collect();
    assert_eq!(all.len(), 40);
    assert_eq!(distinct.len(), 40);
}

#[test]
fn test_concurrent_hash_insert_has_one_winner() {
    let dir = tempdir().unwrap();
    let db = seeded_db(dir.path(), NODES);

    let results = race(&db, |i, ledger| {
        let origin = HashOrigin {
            site_id: format!("site{}.example.com", i),
            pass: 1,
        };
        ledger.insert_hash("same-content", &origin).unwrap()
    });

    assert_eq!(results.iter().filter(|won| **won).count(), 1);

    let ledger = SqliteLedger::new(&db).unwrap();
    assert_eq!(ledger.count_hashes().unwrap(), 1);
    assert!(ledger.hash_exists("same-content").unwrap());
}

#[test]
fn test_high_tier_sites_invisible_to_low_nodes() {
    let dir = tempdir().unwrap();
    let db = seeded_db(dir.path(), 1);
    let mut ledger = SqliteLedger::new(&db).unwrap();

    assert!(!ledger
        .try_claim("site0.example.com", "high-1", MemoryTier::High, LEASE)
        .unwrap());
    assert!(ledger
        .try_claim("site0.example.com", "low-1", MemoryTier::Low, LEASE)
        .unwrap());
}

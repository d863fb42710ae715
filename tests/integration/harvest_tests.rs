//! End-to-end site passes with scripted fetchers
//!
//! Every node gets its own connection to an on-disk ledger, as separate processes would.

use crate::common::{
    article, create_test_config, page_seeds, FixedMemory, FlakyStore, MemoryStore,
    ScriptedFetcher,
};
use corpus_harvest::crawler::{FetchError, Orchestrator, Worker};
use corpus_harvest::output::{generate_review_report, load_statistics};
use corpus_harvest::storage::ErrorKind;
use corpus_harvest::{HarvestError, Ledger, MemoryTier, SiteStatus, SqliteLedger};
use rusqlite::params;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

fn node(
    node_id: &str,
    tier: MemoryTier,
    db: &Path,
    threshold: u64,
    fetcher: ScriptedFetcher,
    store: &MemoryStore,
) -> (Orchestrator<SqliteLedger>, Worker) {
    let mut config = create_test_config(node_id, tier, db);
    config.resilience.low_yield_threshold = threshold;

    let ledger = SqliteLedger::new(db).unwrap();
    let orchestrator = Orchestrator::new(ledger, node_id, &config.resilience);
    let worker = Worker::new(node_id, &config, Box::new(fetcher), Box::new(store.clone()))
        .with_memory_probe(Box::new(FixedMemory(0)));
    (orchestrator, worker)
}

fn register(db: &Path, site: &str, seeds: &[String]) {
    let mut ledger = SqliteLedger::new(db).unwrap();
    assert!(ledger.register_site(site, seeds).unwrap());
}

#[tokio::test]
async fn test_six_hundred_page_site() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("ledger.db");
    let site = "docs.example.com";
    register(&db, site, &page_seeds(site, 600));

    let mut fetcher = ScriptedFetcher::new();
    for n in 1..=600 {
        let path = format!("/page/{}", n);
        fetcher = match n {
            // Same content as the page before
            100 | 200 | 300 | 400 => fetcher.serve(&path, article(&format!("p{}", n - 1))),
            250 => fetcher.hang(&path),
            _ => fetcher.serve(&path, article(&format!("p{}", n))),
        };
    }

    let store = MemoryStore::default();
    let (mut orchestrator, mut worker) =
        node("node-a", MemoryTier::Low, &db, 500, fetcher, &store);
    let summary = orchestrator.run(&mut worker, None).await.unwrap();

    assert_eq!(summary.sites_processed, 1);
    assert_eq!(summary.pages_attempted, 600);
    assert_eq!(summary.pages_accepted, 595);
    assert_eq!(summary.released.get(&SiteStatus::Completed), Some(&1));

    let record = orchestrator.ledger().get_site(site).unwrap().unwrap();
    assert_eq!(record.status, SiteStatus::Completed);
    assert_eq!(record.attempted_page_count, 600);
    assert_eq!(record.accepted_page_count, 595);

    let errors = orchestrator.ledger().errors_for_site(site).unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::Timeout);
    assert_eq!(
        errors[0].url.as_deref(),
        Some("https://docs.example.com/page/250")
    );

    let pages = store.pages();
    let hashes: HashSet<_> = pages.iter().map(|p| p.content_hash.clone()).collect();
    assert_eq!(pages.len(), 595);
    assert_eq!(hashes.len(), 595);
    assert_eq!(orchestrator.ledger().count_hashes().unwrap(), 595);
}

#[tokio::test]
async fn test_page_error_does_not_abort_site() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("ledger.db");
    let site = "example.com";
    register(&db, site, &page_seeds(site, 10));

    let mut fetcher = ScriptedFetcher::new();
    for n in 1..=10 {
        let path = format!("/page/{}", n);
        fetcher = if n == 3 {
            fetcher.fail(&path, FetchError::Network("connection reset".to_string()))
        } else {
            fetcher.serve(&path, article(&format!("p{}", n)))
        };
    }

    let store = MemoryStore::default();
    let (mut orchestrator, mut worker) = node("node-a", MemoryTier::Low, &db, 5, fetcher, &store);
    orchestrator.run(&mut worker, None).await.unwrap();

    let record = orchestrator.ledger().get_site(site).unwrap().unwrap();
    assert_eq!(record.status, SiteStatus::Completed);
    assert_eq!(record.attempted_page_count, 10);
    assert_eq!(record.accepted_page_count, 9);
    assert_eq!(store.pages().len(), 9);

    let errors = orchestrator.ledger().errors_for_site(site).unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::FetchError);
    assert_eq!(errors[0].url.as_deref(), Some("https://example.com/page/3"));
}

#[tokio::test]
async fn test_out_of_memory_site_moves_to_high_tier() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("ledger.db");
    let site = "heavy.example.com";
    register(&db, site, &page_seeds(site, 20));

    let store = MemoryStore::default();

    // Pages 2 and 3 repeat page 1
    let content = |n: usize| match n {
        2 | 3 => article("p1"),
        _ => article(&format!("p{}", n)),
    };

    let mut low_fetcher = ScriptedFetcher::new();
    for n in 1..=20 {
        let path = format!("/page/{}", n);
        low_fetcher = if n == 5 {
            low_fetcher.fail(&path, FetchError::ResourceExhausted("renderer killed".to_string()))
        } else {
            low_fetcher.serve(&path, content(n))
        };
    }
    let (mut low, mut low_worker) = node("low-1", MemoryTier::Low, &db, 10, low_fetcher, &store);

    let summary = low.run(&mut low_worker, None).await.unwrap();
    assert_eq!(summary.released.get(&SiteStatus::Unclaimed), Some(&1));

    let record = low.ledger().get_site(site).unwrap().unwrap();
    assert_eq!(record.status, SiteStatus::Unclaimed);
    assert_eq!(record.memory_tier, MemoryTier::High);
    assert_eq!(record.accepted_page_count, 2);
    assert_eq!(store.pages().len(), 2);

    // Low-tier nodes never see the site again
    assert!(matches!(
        low.claim_next_site(MemoryTier::Low),
        Err(HarvestError::NoWorkAvailable { .. })
    ));

    let mut high_fetcher = ScriptedFetcher::new();
    for n in 1..=20 {
        high_fetcher = high_fetcher.serve(&format!("/page/{}", n), content(n));
    }
    let (mut high, mut high_worker) =
        node("high-1", MemoryTier::High, &db, 10, high_fetcher, &store);

    let summary = high.run(&mut high_worker, None).await.unwrap();
    // Pages 1 and 4 count once each, the repeats of page 1 stay duplicates
    assert_eq!(summary.pages_attempted, 20);
    assert_eq!(summary.pages_accepted, 18);
    assert_eq!(summary.pages_saved, 16);

    let record = high.ledger().get_site(site).unwrap().unwrap();
    assert_eq!(record.status, SiteStatus::Completed);
    assert_eq!(record.pass_count, 2);
    assert_eq!(record.accepted_page_count, 18);

    // Pages from the interrupted pass are not stored twice
    let urls: HashSet<_> = store.pages().into_iter().map(|p| p.url).collect();
    assert_eq!(store.pages().len(), 18);
    assert_eq!(urls.len(), 18);
    assert_eq!(high.ledger().count_hashes().unwrap(), 18);

    let errors = high.ledger().errors_for_site(site).unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::OutOfMemory);
}

#[tokio::test]
async fn test_out_of_memory_on_high_tier_fails_site() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("ledger.db");
    let site = "huge.example.com";
    register(&db, site, &page_seeds(site, 3));

    let store = MemoryStore::default();
    let exhausted = || {
        ScriptedFetcher::new().fail(
            "/page/1",
            FetchError::ResourceExhausted("renderer killed".to_string()),
        )
    };

    let (mut low, mut low_worker) = node("low-1", MemoryTier::Low, &db, 1, exhausted(), &store);
    low.run(&mut low_worker, None).await.unwrap();

    let (mut high, mut high_worker) =
        node("high-1", MemoryTier::High, &db, 1, exhausted(), &store);
    let summary = high.run(&mut high_worker, None).await.unwrap();
    assert_eq!(summary.released.get(&SiteStatus::Failed), Some(&1));

    let record = high.ledger().get_site(site).unwrap().unwrap();
    assert_eq!(record.status, SiteStatus::Failed);

    let errors = high.ledger().errors_for_site(site).unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e.kind == ErrorKind::OutOfMemory));

    let reviews = high.review_flagged().unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].site.id, site);
}

#[tokio::test]
async fn test_low_yield_site_is_flagged_for_review() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("ledger.db");
    let site = "thin.example.com";
    register(&db, site, &page_seeds(site, 3));

    let fetcher = ScriptedFetcher::new()
        .serve("/page/1", article("p1"))
        .serve("/page/2", "<p>too short</p>".to_string())
        .serve("/page/3", article("p3"));

    let store = MemoryStore::default();
    let (mut orchestrator, mut worker) =
        node("node-a", MemoryTier::Low, &db, 500, fetcher, &store);
    orchestrator.run(&mut worker, None).await.unwrap();

    let record = orchestrator.ledger().get_site(site).unwrap().unwrap();
    assert_eq!(record.status, SiteStatus::Flagged);
    assert_eq!(record.accepted_page_count, 2);

    // Quality rejections are counted, never recorded
    let errors = orchestrator.ledger().errors_for_site(site).unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::LowYield);

    let reviews = orchestrator.review_flagged().unwrap();
    let stats = load_statistics(orchestrator.ledger(), store.pages().len() as u64).unwrap();
    let report_path = dir.path().join("review.md");
    generate_review_report(&reviews, &stats, &report_path).unwrap();

    let report = std::fs::read_to_string(&report_path).unwrap();
    assert!(report.contains("### thin.example.com"));
    assert!(report.contains("low_yield"));
}

#[tokio::test]
async fn test_site_deadline_stops_pass() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("ledger.db");
    let site = "slow.example.com";
    register(&db, site, &page_seeds(site, 5));

    let mut config = create_test_config("node-a", MemoryTier::Low, &db);
    config.resilience.site_deadline_ms = 0;

    let store = MemoryStore::default();
    let ledger = SqliteLedger::new(&db).unwrap();
    let mut orchestrator = Orchestrator::new(ledger, "node-a", &config.resilience);
    let mut worker = Worker::new(
        "node-a",
        &config,
        Box::new(ScriptedFetcher::new().serve("/page/1", article("p1"))),
        Box::new(store.clone()),
    )
    .with_memory_probe(Box::new(FixedMemory(0)));

    let site_record = orchestrator.claim_next_site(MemoryTier::Low).unwrap();
    let report = worker
        .process_site(orchestrator.ledger_mut(), &site_record)
        .await
        .unwrap();

    assert!(report.deadline_reached);
    assert_eq!(report.attempted, 0);
    assert_eq!(
        orchestrator.release(&site_record, &report).unwrap(),
        SiteStatus::Flagged
    );
}

#[tokio::test]
async fn test_stale_claim_is_taken_over() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("ledger.db");
    let site = "example.com";
    register(&db, site, &page_seeds(site, 2));

    let store = MemoryStore::default();
    let fetcher = || {
        ScriptedFetcher::new()
            .serve("/page/1", article("p1"))
            .serve("/page/2", article("p2"))
    };

    let (mut node_a, mut worker_a) = node("node-a", MemoryTier::Low, &db, 1, fetcher(), &store);
    let claimed_by_a = node_a.claim_next_site(MemoryTier::Low).unwrap();

    // node-a goes silent for longer than the lease
    let past = (chrono::Utc::now() - chrono::Duration::hours(1))
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    rusqlite::Connection::open(&db)
        .unwrap()
        .execute(
            "UPDATE sites SET heartbeat_at = ?1 WHERE id = ?2",
            params![past, site],
        )
        .unwrap();

    let (mut node_b, mut worker_b) = node("node-b", MemoryTier::Low, &db, 1, fetcher(), &store);
    assert_eq!(node_b.reclaim_stale().unwrap(), vec![site.to_string()]);

    let summary = node_b.run(&mut worker_b, None).await.unwrap();
    assert_eq!(summary.released.get(&SiteStatus::Completed), Some(&1));

    // node-a wakes up and tries to finish its pass
    let report = worker_a
        .process_site(node_a.ledger_mut(), &claimed_by_a)
        .await
        .unwrap();
    assert_eq!(report.accepted, 0);
    assert!(report.claim_lost);
    assert!(matches!(
        node_a.release(&claimed_by_a, &report),
        Err(HarvestError::ClaimLost { .. })
    ));

    let record = node_b.ledger().get_site(site).unwrap().unwrap();
    assert_eq!(record.status, SiteStatus::Completed);
    assert_eq!(record.claimed_by.as_deref(), Some("node-b"));
}

#[tokio::test]
async fn test_slow_pages_keep_claim_alive() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("ledger.db");
    let site = "slow.example.com";
    register(&db, site, &page_seeds(site, 5));

    // Page-count heartbeats alone would leave the claim silent for the whole pass
    let mut config = create_test_config("node-a", MemoryTier::Low, &db);
    config.resilience.page_timeout_ms = 400;
    config.resilience.lease_secs = 1;
    config.resilience.heartbeat_every_pages = 10;
    config.resilience.low_yield_threshold = 1;

    let mut fetcher = ScriptedFetcher::new();
    for n in 1..=5 {
        fetcher = fetcher.hang(&format!("/page/{}", n));
    }

    let ledger = SqliteLedger::new(&db).unwrap();
    let mut orchestrator = Orchestrator::new(ledger, "node-a", &config.resilience);
    let mut worker = Worker::new(
        "node-a",
        &config,
        Box::new(fetcher),
        Box::new(MemoryStore::default()),
    )
    .with_memory_probe(Box::new(FixedMemory(0)));
    let claimed = orchestrator.claim_next_site(MemoryTier::Low).unwrap();

    // Another node polls for work while node-a is stuck on its fourth page
    let rival = async {
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let mut ledger = SqliteLedger::new(&db).unwrap();
        ledger
            .claim_next("node-b", MemoryTier::Low, Duration::from_secs(1))
            .unwrap()
    };

    let (report, rival_claim) = tokio::join!(
        worker.process_site(orchestrator.ledger_mut(), &claimed),
        rival
    );
    let report = report.unwrap();

    assert!(rival_claim.is_none());
    assert!(!report.claim_lost);
    assert_eq!(report.attempted, 5);
    assert_eq!(report.timeouts, 5);

    let record = orchestrator.ledger().get_site(site).unwrap().unwrap();
    assert_eq!(record.claimed_by.as_deref(), Some("node-a"));
    assert_eq!(record.lease_expirations, 0);
    assert_eq!(
        orchestrator.release(&claimed, &report).unwrap(),
        SiteStatus::Flagged
    );
}

#[tokio::test]
async fn test_store_failure_does_not_consume_hash() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("ledger.db");
    register(&db, "a.example.com", &page_seeds("a.example.com", 2));
    register(&db, "b.example.com", &page_seeds("b.example.com", 1));

    // Both sites serve the same first page
    let fetcher = ScriptedFetcher::new()
        .serve("/page/1", article("shared"))
        .serve("/page/2", article("a2"));

    let mut config = create_test_config("node-a", MemoryTier::Low, &db);
    config.resilience.low_yield_threshold = 1;

    let store = MemoryStore::default();
    let ledger = SqliteLedger::new(&db).unwrap();
    let mut orchestrator = Orchestrator::new(ledger, "node-a", &config.resilience);
    let mut worker = Worker::new(
        "node-a",
        &config,
        Box::new(fetcher),
        Box::new(FlakyStore::new(store.clone(), 1)),
    )
    .with_memory_probe(Box::new(FixedMemory(0)));

    let summary = orchestrator.run(&mut worker, None).await.unwrap();
    assert_eq!(summary.sites_processed, 2);
    assert_eq!(summary.released.get(&SiteStatus::Completed), Some(&2));

    let record = orchestrator.ledger().get_site("a.example.com").unwrap().unwrap();
    assert_eq!(record.attempted_page_count, 2);
    assert_eq!(record.accepted_page_count, 1);

    let errors = orchestrator.ledger().errors_for_site("a.example.com").unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::StoreError);
    assert_eq!(errors[0].url.as_deref(), Some("https://a.example.com/page/1"));

    // The content that failed to save on a.example.com is admitted on b.example.com
    let pages = store.pages();
    assert_eq!(pages.len(), 2);
    assert!(pages
        .iter()
        .any(|p| p.site_id == "b.example.com" && p.url == "https://b.example.com/page/1"));
    assert_eq!(orchestrator.ledger().count_hashes().unwrap(), 2);
}

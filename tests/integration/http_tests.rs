//! HTTP fetcher tests against a wiremock server

use crate::common::{article, create_test_config, FixedMemory};
use corpus_harvest::crawler::{FetchError, Fetcher, HttpFetcher, Orchestrator, Worker};
use corpus_harvest::storage::{ErrorKind, SqlitePageStore};
use corpus_harvest::{Ledger, MemoryTier, SiteStatus, SqliteLedger};
use std::time::Duration;
use tempfile::tempdir;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/html")
}

#[tokio::test]
async fn test_http_site_pass() {
    // Start a mock server
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // Site id is the mock server host (e.g., "127.0.0.1")
    let site = Url::parse(&base_url)
        .expect("Failed to parse base URL")
        .host_str()
        .expect("Failed to extract host")
        .to_string();

    let home = format!(
        r#"<html><body>{}
        <ul>
            <li><a href="/alpha">Alpha</a></li>
            <li><a href="/big">Big</a></li>
            <li><a href="/missing">Missing</a></li>
            <li><a href="/report.pdf">Report</a></li>
            <li><a href="/slow">Slow</a></li>
            <li><a href="https://elsewhere.example.org/">Elsewhere</a></li>
        </ul></body></html>"#,
        article("home")
    );

    // The home page only answers to our user agent
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header(
            "user-agent",
            "TestHarvester/1.0.0 (+https://example.com/contact)",
        ))
        .respond_with(html(home))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/alpha"))
        .respond_with(html(article("alpha")))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(vec![b'a'; 2 * 1024 * 1024], "text/html"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html(article("slow")).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let dir = tempdir().unwrap();
    let db = dir.path().join("ledger.db");
    let mut config = create_test_config("node-a", MemoryTier::Low, &db);
    config.resilience.page_timeout_ms = 1_000;
    config.resilience.low_yield_threshold = 2;

    let mut ledger = SqliteLedger::new(&db).unwrap();
    ledger
        .register_site(&site, &[format!("{}/", base_url)])
        .unwrap();

    let fetcher = HttpFetcher::new(&config.fetcher, config.gate.max_raw_bytes).unwrap();
    let store = SqlitePageStore::new(&db).unwrap();
    let mut worker = Worker::new("node-a", &config, Box::new(fetcher), Box::new(store))
        .with_memory_probe(Box::new(FixedMemory(0)));
    let mut orchestrator = Orchestrator::new(ledger, "node-a", &config.resilience);

    let summary = orchestrator.run(&mut worker, None).await.unwrap();

    assert_eq!(summary.pages_attempted, 6);
    assert_eq!(summary.pages_accepted, 2);
    assert_eq!(summary.released.get(&SiteStatus::Completed), Some(&1));

    let mut errors = orchestrator.ledger().errors_for_site(&site).unwrap();
    errors.sort_by(|a, b| a.url.cmp(&b.url));
    let kinds: Vec<_> = errors
        .iter()
        .map(|e| (e.url.clone().unwrap_or_default(), e.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (format!("{}/missing", base_url), ErrorKind::FetchError),
            (format!("{}/report.pdf", base_url), ErrorKind::FetchError),
            (format!("{}/slow", base_url), ErrorKind::Timeout),
        ]
    );

    // The oversized page is rejected by the gate, not recorded
    let store = SqlitePageStore::new(&db).unwrap();
    assert_eq!(store.count_documents(Some(&site)).unwrap(), 2);
}

#[tokio::test]
async fn test_http_fetcher_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/image"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 16], "image/png"))
        .mount(&mock_server)
        .await;

    let dir = tempdir().unwrap();
    let config = create_test_config("node-a", MemoryTier::Low, &dir.path().join("ledger.db"));
    let fetcher = HttpFetcher::new(&config.fetcher, 1024).unwrap();

    let gone = Url::parse(&format!("{}/gone", mock_server.uri())).unwrap();
    assert_eq!(fetcher.fetch(&gone).await.unwrap_err(), FetchError::Status(410));

    let image = Url::parse(&format!("{}/image", mock_server.uri())).unwrap();
    assert!(matches!(
        fetcher.fetch(&image).await.unwrap_err(),
        FetchError::ContentMismatch(_)
    ));
}

#[tokio::test]
async fn test_http_fetcher_caps_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/huge"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(vec![b'x'; 64 * 1024], "text/plain"),
        )
        .mount(&mock_server)
        .await;

    let dir = tempdir().unwrap();
    let config = create_test_config("node-a", MemoryTier::Low, &dir.path().join("ledger.db"));
    let fetcher = HttpFetcher::new(&config.fetcher, 1024).unwrap();

    let url = Url::parse(&format!("{}/huge", mock_server.uri())).unwrap();
    let page = fetcher.fetch(&url).await.unwrap();

    assert_eq!(page.status_code, 200);
    assert_eq!(page.body.len(), 1025);
}

//! Shared fixtures for the integration tests

use async_trait::async_trait;
use corpus_harvest::config::{
    Config, FetcherConfig, GateConfig, NodeConfig, OutputConfig, ResilienceConfig,
};
use corpus_harvest::crawler::{FetchError, FetchedPage, Fetcher, MemoryProbe};
use corpus_harvest::storage::{LedgerError, LedgerResult, Page, PageStore};
use corpus_harvest::MemoryTier;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Creates a test configuration for a node of `tier` writing to `db_path`
pub fn create_test_config(node_id: &str, tier: MemoryTier, db_path: &Path) -> Config {
    Config {
        node: NodeConfig {
            node_id: Some(node_id.to_string()),
            tier,
        },
        gate: GateConfig::default(),
        resilience: ResilienceConfig {
            page_timeout_ms: 100, // Very short for testing
            ..ResilienceConfig::default()
        },
        fetcher: FetcherConfig {
            crawler_name: "TestHarvester".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            max_pages_per_site: 5_000,
            follow_links: true,
        },
        output: OutputConfig {
            database_path: db_path.display().to_string(),
            review_path: "./test_review.md".to_string(),
        },
        sites: Vec::new(),
    }
}

/// 100 words unique to `tag`
pub fn article(tag: &str) -> String {
    let words = (0..100)
        .map(|i| format!("{}w{}", tag, i))
        .collect::<Vec<_>>()
        .join(" ");
    format!("<html><body><article><p>{}</p></article></body></html>", words)
}

/// What the scripted fetcher does for one path
#[derive(Clone)]
pub enum Behaviour {
    Serve(String),
    Hang,
    Fail(FetchError),
}

/// Fetcher answering from a fixed path table; unknown paths are 404s
#[derive(Default)]
pub struct ScriptedFetcher {
    pages: HashMap<String, Behaviour>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(mut self, path: &str, body: String) -> Self {
        self.pages.insert(path.to_string(), Behaviour::Serve(body));
        self
    }

    pub fn hang(mut self, path: &str) -> Self {
        self.pages.insert(path.to_string(), Behaviour::Hang);
        self
    }

    pub fn fail(mut self, path: &str, error: FetchError) -> Self {
        self.pages.insert(path.to_string(), Behaviour::Fail(error));
        self
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        match self.pages.get(url.path()) {
            Some(Behaviour::Serve(body)) => Ok(FetchedPage {
                final_url: url.clone(),
                status_code: 200,
                body: body.clone().into_bytes(),
            }),
            Some(Behaviour::Hang) => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(FetchError::Network("hung".to_string()))
            }
            Some(Behaviour::Fail(e)) => Err(e.clone()),
            None => Err(FetchError::Status(404)),
        }
    }
}

/// Page store keeping everything in memory, shareable between nodes
#[derive(Clone, Default)]
pub struct MemoryStore(pub Arc<Mutex<Vec<Page>>>);

impl MemoryStore {
    pub fn pages(&self) -> Vec<Page> {
        self.0.lock().unwrap().clone()
    }
}

impl PageStore for MemoryStore {
    fn save(&mut self, page: &Page) -> LedgerResult<()> {
        self.0.lock().unwrap().push(page.clone());
        Ok(())
    }
}

/// Page store that refuses its first `failures` saves
pub struct FlakyStore {
    inner: MemoryStore,
    failures: usize,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore, failures: usize) -> Self {
        Self { inner, failures }
    }
}

impl PageStore for FlakyStore {
    fn save(&mut self, page: &Page) -> LedgerResult<()> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(LedgerError::Database("disk full".to_string()));
        }
        self.inner.save(page)
    }
}

/// Memory probe reporting a constant resident size
pub struct FixedMemory(pub u64);

impl MemoryProbe for FixedMemory {
    fn resident_bytes(&self) -> Option<u64> {
        Some(self.0)
    }
}

/// Seed URLs `https://<site>/page/<n>` for `n` in `1..=count`
pub fn page_seeds(site: &str, count: usize) -> Vec<String> {
    (1..=count)
        .map(|n| format!("https://{}/page/{}", site, n))
        .collect()
}

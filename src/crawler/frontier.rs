//! Per-site crawl frontier
//!
//! Holds the URLs a single site pass still has to attempt. URLs are normalized before
//! they are queued, off-site URLs are ignored, and the total number of URLs a pass may
//! ever queue is capped.

use crate::url::{belongs_to_site, normalize_url};
use std::collections::{HashSet, VecDeque};
use url::Url;

/// FIFO queue of pages for one site
#[derive(Debug)]
pub struct SiteFrontier {
    site_id: String,
    queue: VecDeque<Url>,
    seen: HashSet<String>,
    limit: usize,
}

impl SiteFrontier {
    pub fn new(site_id: &str, limit: usize) -> Self {
        Self {
            site_id: site_id.to_string(),
            queue: VecDeque::new(),
            seen: HashSet::new(),
            limit,
        }
    }

    /// Queues a URL if it is on-site, unseen, and the cap allows it
    ///
    /// Returns true if the URL was queued.
    pub fn push(&mut self, url: &str) -> bool {
        if self.seen.len() >= self.limit {
            return false;
        }

        let normalized = match normalize_url(url) {
            Ok(u) => u,
            Err(e) => {
                tracing::trace!("Skipping unusable URL {}: {}", url, e);
                return false;
            }
        };

        if !belongs_to_site(&normalized, &self.site_id) {
            return false;
        }

        if !self.seen.insert(normalized.to_string()) {
            return false;
        }

        self.queue.push_back(normalized);
        true
    }

    pub fn pop(&mut self) -> Option<Url> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of distinct URLs ever queued
    pub fn discovered(&self) -> usize {
        self.seen.len()
    }
}

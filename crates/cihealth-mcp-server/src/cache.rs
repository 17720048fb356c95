use std::sync::Arc;
use std::time::Duration;

use cihealth_core::Results;
use moka::sync::Cache;

pub type SharedResults = Arc<Results>;

/// Results feeds keyed by feed URL, expired after a fixed TTL.
pub struct ResultsCache {
    feeds: Cache<String, SharedResults>,
}

impl ResultsCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        Self {
            feeds: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn get(&self, url: &str) -> Option<SharedResults> {
        self.feeds.get(url)
    }

    pub fn insert(&self, url: &str, results: SharedResults) {
        self.feeds.insert(url.to_string(), results);
    }
}

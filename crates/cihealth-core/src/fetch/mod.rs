//! Fetching layer: one trait, one timeout policy.
//!
//! Callers above this module never see status codes. A 404 is a
//! [`FetchOutcome::Missing`], everything else that is not 2xx is an error.

use async_trait::async_trait;

use crate::error::HealthResult;

mod http;
#[cfg(test)]
pub(crate) mod memory;

pub use http::HttpFetcher;

/// Body of a GET, or the fact that nothing lives at the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Found(String),
    Missing,
}

impl FetchOutcome {
    pub fn into_option(self) -> Option<String> {
        match self {
            Self::Found(body) => Some(body),
            Self::Missing => None,
        }
    }
}

/// Source of remote documents.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str) -> HealthResult<FetchOutcome>;
}

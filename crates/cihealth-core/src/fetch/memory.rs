//! In-memory fetcher for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{HealthError, HealthResult};

use super::{FetchOutcome, Fetcher};

#[derive(Debug, Clone)]
enum Canned {
    Body(String),
    Status(u16),
    Unreachable,
}

/// Serves canned bodies; unknown URLs are 404.
#[derive(Debug, Default)]
pub(crate) struct MemoryFetcher {
    routes: HashMap<String, Canned>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_body(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.routes.insert(url.into(), Canned::Body(body.into()));
        self
    }

    pub(crate) fn with_status(mut self, url: impl Into<String>, status: u16) -> Self {
        self.routes.insert(url.into(), Canned::Status(status));
        self
    }

    pub(crate) fn with_unreachable(mut self, url: impl Into<String>) -> Self {
        self.routes.insert(url.into(), Canned::Unreachable);
        self
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn get(&self, url: &str) -> HealthResult<FetchOutcome> {
        self.requests.lock().unwrap().push(url.to_string());
        match self.routes.get(url) {
            Some(Canned::Body(body)) => Ok(FetchOutcome::Found(body.clone())),
            Some(Canned::Status(404)) | None => Ok(FetchOutcome::Missing),
            Some(Canned::Status(code)) => Err(HealthError::Http {
                url: url.to_string(),
                status: *code,
            }),
            Some(Canned::Unreachable) => Err(HealthError::Network {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

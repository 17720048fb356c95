//! reqwest-backed fetcher: status mapping lives here and nowhere else.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::config::HealthConfig;
use crate::error::{HealthError, HealthResult};

use super::{FetchOutcome, Fetcher};

const USER_AGENT_VALUE: &str = concat!("cihealth/", env!("CARGO_PKG_VERSION"));

/// HTTP fetcher with the configured request and connect timeouts.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &HealthConfig) -> HealthResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| HealthError::Config {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str) -> HealthResult<FetchOutcome> {
        debug!(url = %url, "GET");

        let network = |e: reqwest::Error| HealthError::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(network)?;
        let status = response.status();

        match status.as_u16() {
            200..=299 => {
                let body = response.text().await.map_err(network)?;
                Ok(FetchOutcome::Found(body))
            }
            404 => {
                debug!(url = %url, "not found");
                Ok(FetchOutcome::Missing)
            }
            code => Err(HealthError::Http {
                url: url.to_string(),
                status: code,
            }),
        }
    }
}

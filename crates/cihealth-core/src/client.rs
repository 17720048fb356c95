//! Client facade over the fetcher: one method per remote document.
//!
//! No status code knowledge here; see `fetch::http`.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::HealthConfig;
use crate::error::{HealthError, HealthResult};
use crate::fetch::{FetchOutcome, Fetcher, HttpFetcher};
use crate::junit::parse_test_suite;
use crate::prowjob::{parse_prowjob, ProwJobInfo};
use crate::quarantine::QuarantineSet;
use crate::types::{JobRun, Results, RunStatus, TestSuite};

/// Entry point for every CI query.
#[derive(Clone)]
pub struct CiHealthClient {
    fetcher: Arc<dyn Fetcher>,
    config: Arc<HealthConfig>,
}

impl std::fmt::Debug for CiHealthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CiHealthClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CiHealthClient {
    pub fn new(config: HealthConfig) -> HealthResult<Self> {
        config.validate()?;
        let fetcher = HttpFetcher::new(&config)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    pub fn from_env() -> HealthResult<Self> {
        Self::new(HealthConfig::from_env())
    }

    /// Use a custom fetcher (caching layer, fixtures).
    pub fn with_fetcher(config: HealthConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    pub(crate) async fn get(&self, url: &str) -> HealthResult<FetchOutcome> {
        self.fetcher.get(url).await
    }

    /// GET that treats a missing document as an error.
    pub(crate) async fn get_required(&self, url: &str) -> HealthResult<String> {
        match self.get(url).await? {
            FetchOutcome::Found(body) => Ok(body),
            FetchOutcome::Missing => Err(HealthError::Http {
                url: url.to_string(),
                status: 404,
            }),
        }
    }

    /// Failed-job leaderboard.
    pub async fn fetch_results(&self) -> HealthResult<Results> {
        let url = &self.config.results_url;
        debug!(url = %url, "fetching results feed");
        let body = self.get_required(url).await?;
        serde_json::from_str(&body).map_err(|e| HealthError::parse(url, e))
    }

    /// JUnit suite behind a leaderboard failure URL; `None` on 404.
    pub async fn fetch_test_suite(&self, run_url: &str) -> HealthResult<Option<TestSuite>> {
        self.fetch_test_suite_at(&self.config.junit_url(run_url))
            .await
    }

    /// JUnit suite at an artifact URL; `None` on 404.
    pub async fn fetch_test_suite_at(&self, junit_url: &str) -> HealthResult<Option<TestSuite>> {
        match self.get(junit_url).await? {
            FetchOutcome::Found(xml) => parse_test_suite(junit_url, &xml).map(Some),
            FetchOutcome::Missing => Ok(None),
        }
    }

    /// prowjob metadata of a run; `None` on 404.
    pub async fn fetch_prowjob(&self, run_url: &str) -> HealthResult<Option<ProwJobInfo>> {
        let url = self.config.prowjob_url(run_url);
        match self.get(&url).await? {
            FetchOutcome::Found(body) => parse_prowjob(&url, &body).map(Some),
            FetchOutcome::Missing => Ok(None),
        }
    }

    /// Quarantined test names, including the built-in fallback list.
    pub async fn fetch_quarantined_tests(&self) -> HealthResult<QuarantineSet> {
        let url = &self.config.quarantine_url;
        debug!(url = %url, "fetching quarantine report");
        let html = self.get_required(url).await?;
        Ok(QuarantineSet::from_report(&html))
    }

    /// Fill status, job type, timestamp, PR ref and failing test cases of a run.
    ///
    /// Missing or unusable metadata sets the status to UNKNOWN. JUnit
    /// candidates that are absent or unparsable are skipped; a transport
    /// failure aborts.
    pub async fn enrich_run(&self, run: &mut JobRun) -> HealthResult<()> {
        match self.fetch_prowjob(&run.url).await {
            Ok(Some(info)) => {
                run.status = info.status;
                if info.job_type.is_some() {
                    run.job_type = info.job_type;
                }
                if run.timestamp.is_none() {
                    run.timestamp = info.started;
                }
                run.pull_request = info.pull_request;
            }
            Ok(None) => {
                debug!(url = %run.url, "no prowjob metadata");
                run.status = RunStatus::Unknown;
            }
            Err(e @ HealthError::Network { .. }) => return Err(e),
            Err(e) => {
                warn!(url = %run.url, error = %e, "unusable prowjob metadata");
                run.status = RunStatus::Unknown;
            }
        }

        let artifacts = self.config.artifacts_url(&run.url);
        for path in &self.config.layout.junit_candidates {
            let url = format!("{artifacts}{path}");
            match self.fetch_test_suite_at(&url).await {
                Ok(Some(suite)) => {
                    run.failures = suite
                        .failed_cases()
                        .cloned()
                        .map(|mut tc| {
                            tc.url = run.url.clone();
                            tc.job_type = run.job_type;
                            tc
                        })
                        .collect();
                    debug!(url = %url, failures = run.failures.len(), "junit attached");
                    return Ok(());
                }
                Ok(None) => continue,
                Err(e @ HealthError::Network { .. }) => return Err(e),
                Err(e) => debug!(url = %url, error = %e, "junit candidate unusable"),
            }
        }

        if run.status == RunStatus::Unknown {
            debug!(url = %run.url, "run has neither metadata nor junit");
        }
        Ok(())
    }
}

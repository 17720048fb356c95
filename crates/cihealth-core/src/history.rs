//! Job history: page walking, time windows and the multi-source merge.
//!
//! A job's runs are spread over three places: presubmit history pages,
//! batch runs in a bucket listing, and periodic/postsubmit history pages.
//! Each source is walked newest-first and the results are merged.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::client::CiHealthClient;
use crate::error::{HealthError, HealthResult};
use crate::fetch::FetchOutcome;
use crate::period::{cutoff, parse_timestamp};
use crate::types::{JobRun, JobType, RunStatus};

/// Where a run was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySource {
    Presubmit,
    Batch,
    Periodic,
}

impl HistorySource {
    pub const ALL: [HistorySource; 3] = [Self::Presubmit, Self::Batch, Self::Periodic];

    fn job_type(self) -> Option<JobType> {
        match self {
            Self::Presubmit => Some(JobType::Presubmit),
            Self::Batch => Some(JobType::Batch),
            // periodic or postsubmit; prowjob metadata decides
            Self::Periodic => None,
        }
    }
}

impl fmt::Display for HistorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Presubmit => "presubmit",
            Self::Batch => "batch",
            Self::Periodic => "periodic",
        })
    }
}

/// One element of a history page's `allBuilds` array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryBuild {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "SpyglassLink", default)]
    pub spyglass_link: String,
    #[serde(rename = "Started", default)]
    pub started: Option<String>,
    #[serde(rename = "Result", default)]
    pub result: String,
}

fn all_builds_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)allBuilds\s*=\s*(\[.*?\]);").expect("static history regex"))
}

/// Extract the embedded `allBuilds` array from a history page.
pub fn parse_history_page(url: &str, html: &str) -> HealthResult<Vec<HistoryBuild>> {
    let caps = all_builds_regex()
        .captures(html)
        .ok_or_else(|| HealthError::parse(url, "could not find allBuilds JSON in page content"))?;
    serde_json::from_str(&caps[1]).map_err(|e| HealthError::parse(url, e))
}

/// Build ids found in a gcsweb listing of `.../batch/<job>/`, newest first.
pub fn parse_batch_listing(job: &str, html: &str) -> Vec<String> {
    let pattern = format!(r"/batch/{}/(\d+)/", regex::escape(job));
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut ids: Vec<String> = re
        .captures_iter(html)
        .map(|caps| caps[1].to_string())
        .filter(|id| seen.insert(id.clone()))
        .collect();
    // numeric order without overflow: longer ids are larger
    ids.sort_by(|a, b| (b.len(), b).cmp(&(a.len(), a)));
    ids
}

/// Dedupe by id (first occurrence wins), newest first, at most `limit`.
///
/// Runs whose timestamp parses sort above the rest; unparsable timestamps
/// fall back to raw string order.
pub fn merge_runs(runs: Vec<JobRun>, limit: usize) -> Vec<JobRun> {
    let mut seen = HashSet::new();
    let mut merged: Vec<JobRun> = runs
        .into_iter()
        .filter(|run| seen.insert(run.id.clone()))
        .collect();
    merged.sort_by_cached_key(|run| {
        let raw = run.timestamp.clone();
        Reverse((raw.as_deref().and_then(parse_timestamp), raw))
    });
    merged.truncate(limit);
    merged
}

#[derive(Debug, Deserialize)]
struct Started {
    timestamp: i64,
}

impl CiHealthClient {
    /// The `limit` most recent runs of `job` across all sources.
    pub async fn fetch_job_history(&self, job: &str, limit: usize) -> HealthResult<Vec<JobRun>> {
        self.collect_history(job, limit, None).await
    }

    /// Runs of `job` started within `period`, at most `max_limit`.
    ///
    /// A zero period behaves like [`fetch_job_history`](Self::fetch_job_history).
    pub async fn fetch_job_history_with_time_period(
        &self,
        job: &str,
        period: Duration,
        max_limit: usize,
    ) -> HealthResult<Vec<JobRun>> {
        if period.is_zero() {
            return self.fetch_job_history(job, max_limit).await;
        }
        self.collect_history(job, max_limit, cutoff(period, Utc::now()))
            .await
    }

    async fn collect_history(
        &self,
        job: &str,
        limit: usize,
        cutoff: Option<DateTime<Utc>>,
    ) -> HealthResult<Vec<JobRun>> {
        let mut runs = Vec::new();
        for source in HistorySource::ALL {
            match self.source_runs(source, job, limit, cutoff).await {
                Ok(found) => {
                    info!(job = %job, source = %source, runs = found.len(), "history source read");
                    runs.extend(found);
                }
                Err(e) => warn!(job = %job, source = %source, error = %e, "history source failed"),
            }
        }

        let merged = merge_runs(runs, limit);
        if merged.is_empty() {
            return Err(HealthError::NoJobHistory {
                job: job.to_string(),
            });
        }
        Ok(merged)
    }

    async fn source_runs(
        &self,
        source: HistorySource,
        job: &str,
        limit: usize,
        cutoff: Option<DateTime<Utc>>,
    ) -> HealthResult<Vec<JobRun>> {
        match source {
            HistorySource::Presubmit => {
                let base = self.config().presubmit_history_url(job);
                self.walk_history_pages(&base, source, limit, cutoff).await
            }
            HistorySource::Periodic => {
                let base = self.config().periodic_history_url(job);
                self.walk_history_pages(&base, source, limit, cutoff).await
            }
            HistorySource::Batch => self.batch_runs(job, limit, cutoff).await,
        }
    }

    /// Follow `?buildId=` cursors until `limit` runs, the cutoff, or a page
    /// without builds.
    async fn walk_history_pages(
        &self,
        base_url: &str,
        source: HistorySource,
        limit: usize,
        cutoff: Option<DateTime<Utc>>,
    ) -> HealthResult<Vec<JobRun>> {
        let mut runs = Vec::new();
        let mut cursor: Option<String> = None;

        while runs.len() < limit {
            let url = match &cursor {
                Some(id) => format!("{base_url}?buildId={id}"),
                None => base_url.to_string(),
            };
            debug!(url = %url, "fetching history page");

            let html = match self.get(&url).await? {
                FetchOutcome::Found(html) => html,
                FetchOutcome::Missing => break,
            };
            let builds = parse_history_page(&url, &html)?;
            let Some(last_id) = builds.last().map(|b| b.id.clone()) else {
                break;
            };

            for build in builds {
                if runs.len() >= limit {
                    break;
                }
                // some deployments repeat the cursor build at the top of the next page
                if cursor.as_deref() == Some(build.id.as_str()) {
                    continue;
                }
                let started = build.started.filter(|s| !s.is_empty());
                if let (Some(cutoff), Some(ts)) = (cutoff, started.as_deref().and_then(parse_timestamp)) {
                    if ts < cutoff {
                        return Ok(runs);
                    }
                }
                runs.push(JobRun {
                    url: self.config().absolute_prow_link(&build.spyglass_link),
                    id: build.id,
                    // prowjob metadata decides during enrichment
                    status: RunStatus::Unknown,
                    job_type: source.job_type(),
                    timestamp: started,
                    ..JobRun::default()
                });
            }

            if cursor.as_deref() == Some(last_id.as_str()) {
                break;
            }
            cursor = Some(last_id);
        }

        Ok(runs)
    }

    /// Batch runs have no history page; list the bucket and filter here.
    async fn batch_runs(
        &self,
        job: &str,
        limit: usize,
        cutoff: Option<DateTime<Utc>>,
    ) -> HealthResult<Vec<JobRun>> {
        let listing_url = self.config().batch_listing_url(job);
        let html = match self.get(&listing_url).await? {
            FetchOutcome::Found(html) => html,
            FetchOutcome::Missing => return Ok(Vec::new()),
        };

        let mut runs = Vec::new();
        for id in parse_batch_listing(job, &html) {
            if runs.len() >= limit {
                break;
            }
            let mut run = JobRun::new(id.clone(), self.config().batch_run_url(job, &id));
            run.job_type = Some(JobType::Batch);

            if let Some(cutoff) = cutoff {
                if let Some(started) = self.batch_started(&run.url).await {
                    if started < cutoff {
                        break;
                    }
                    run.timestamp = Some(started.to_rfc3339());
                }
            }
            runs.push(run);
        }
        Ok(runs)
    }

    async fn batch_started(&self, run_url: &str) -> Option<DateTime<Utc>> {
        let url = self.config().started_url(run_url);
        let body = match self.get(&url).await {
            Ok(outcome) => outcome.into_option()?,
            Err(e) => {
                debug!(url = %url, error = %e, "started.json unavailable");
                return None;
            }
        };
        let started: Started = serde_json::from_str(&body).ok()?;
        DateTime::from_timestamp(started.timestamp, 0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::HealthConfig;
    use crate::fetch::memory::MemoryFetcher;

    const PROW: &str = "https://prow.ci.kubevirt.io";

    fn page(builds: &[(&str, &str)]) -> String {
        let items: Vec<String> = builds
            .iter()
            .map(|(id, started)| {
                format!(
                    r#"{{"SpyglassLink":"/view/gs/kubevirt-prow/pr-logs/pull/kubevirt_kubevirt/1/job/{id}","ID":"{id}","Started":"{started}","Duration":1,"Result":"FAILURE","Refs":null}}"#
                )
            })
            .collect();
        format!(
            "<html><script>var allBuilds = [{}];\nvar other = 1;</script></html>",
            items.join(",")
        )
    }

    fn presubmit_base(job: &str) -> String {
        format!("{PROW}/job-history/gs/kubevirt-prow/pr-logs/directory/{job}")
    }

    fn client(fetcher: MemoryFetcher) -> CiHealthClient {
        CiHealthClient::with_fetcher(HealthConfig::default(), Arc::new(fetcher))
    }

    #[test]
    fn test_parse_history_page() {
        let html = page(&[("3", "2024-05-03T00:00:00Z"), ("2", "2024-05-02T00:00:00Z")]);
        let builds = parse_history_page("u", &html).unwrap();
        assert_eq!(builds.len(), 2);
        assert_eq!(builds[0].id, "3");
        assert_eq!(builds[1].started.as_deref(), Some("2024-05-02T00:00:00Z"));
    }

    #[test]
    fn test_page_without_builds_is_error() {
        let err = parse_history_page("u", "<html>maintenance</html>").unwrap_err();
        assert!(err.to_string().contains("could not find allBuilds JSON"));
    }

    #[test]
    fn test_merge_dedupes_and_sorts() {
        let run = |id: &str, ts: Option<&str>| JobRun {
            timestamp: ts.map(String::from),
            ..JobRun::new(id, format!("u/{id}"))
        };
        let merged = merge_runs(
            vec![
                run("a", Some("2024-05-01T00:00:00Z")),
                run("b", Some("2024-05-03T00:00:00Z")),
                run("a", Some("2024-06-01T00:00:00Z")),
                run("c", None),
                run("d", Some("2024-05-02T00:00:00Z")),
            ],
            3,
        );
        let ids: Vec<_> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["b", "d", "a"]);
        assert_eq!(merged[2].timestamp.as_deref(), Some("2024-05-01T00:00:00Z"));
    }

    #[test]
    fn test_batch_listing_newest_first() {
        let html = r#"<a href="/gcs/kubevirt-prow/pr-logs/pull/batch/pull-x/998/">998/</a>
<a href="/gcs/kubevirt-prow/pr-logs/pull/batch/pull-x/1002/">1002/</a>
<a href="/gcs/kubevirt-prow/pr-logs/pull/batch/pull-x/1002/">again</a>
<a href="/gcs/kubevirt-prow/pr-logs/pull/batch/pull-x-other/5000/">other job</a>"#;
        assert_eq!(parse_batch_listing("pull-x", html), ["1002", "998"]);
    }

    #[tokio::test]
    async fn test_pagination_follows_cursor() {
        let job = "pull-job";
        let base = presubmit_base(job);
        let client = client(
            MemoryFetcher::new()
                .with_body(&base, page(&[("30", "2024-05-03T00:00:00Z"), ("20", "2024-05-02T00:00:00Z")]))
                .with_body(format!("{base}?buildId=20"), page(&[("10", "2024-05-01T00:00:00Z"), ("5", "2024-04-30T00:00:00Z")])),
        );

        let runs = client.fetch_job_history(job, 3).await.unwrap();
        let ids: Vec<_> = runs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["30", "20", "10"]);
        assert_eq!(
            runs[0].url,
            format!("{PROW}/view/gs/kubevirt-prow/pr-logs/pull/kubevirt_kubevirt/1/job/30")
        );
        assert_eq!(runs[0].job_type, Some(JobType::Presubmit));
        assert_eq!(runs[0].status, RunStatus::Unknown);
    }

    #[tokio::test]
    async fn test_time_window_stops_at_first_old_run() {
        let job = "pull-job";
        let base = presubmit_base(job);
        let now = Utc::now();
        let fresh = (now - chrono::Duration::hours(1)).to_rfc3339();
        let fresher = (now - chrono::Duration::minutes(5)).to_rfc3339();
        let old = (now - chrono::Duration::hours(30)).to_rfc3339();
        let client = client(MemoryFetcher::new().with_body(
            &base,
            page(&[("3", fresher.as_str()), ("2", fresh.as_str()), ("1", old.as_str())]),
        ));

        let runs = client
            .fetch_job_history_with_time_period(job, Duration::from_secs(24 * 3600), 1000)
            .await
            .unwrap();
        let ids: Vec<_> = runs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["3", "2"]);
    }

    #[tokio::test]
    async fn test_unparsable_timestamps_are_kept_in_window() {
        let job = "pull-job";
        let base = presubmit_base(job);
        let client = client(MemoryFetcher::new().with_body(&base, page(&[("9", "")])));
        let runs = client
            .fetch_job_history_with_time_period(job, Duration::from_secs(3600), 10)
            .await
            .unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].timestamp, None);
    }

    #[tokio::test]
    async fn test_merges_sources_and_tolerates_failures() {
        let job = "periodic-job";
        let config = HealthConfig::default();
        let periodic = config.periodic_history_url(job);
        let client = client(
            MemoryFetcher::new()
                .with_status(presubmit_base(job), 500)
                .with_body(
                    config.batch_listing_url(job),
                    format!(r#"<a href="/gcs/kubevirt-prow/pr-logs/pull/batch/{job}/7/">7/</a>"#),
                )
                .with_body(&periodic, page(&[("8", "2024-05-03T00:00:00Z")])),
        );

        let runs = client.fetch_job_history(job, 10).await.unwrap();
        let ids: Vec<_> = runs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["8", "7"]);
        assert_eq!(runs[0].job_type, None);
        assert_eq!(runs[1].job_type, Some(JobType::Batch));
    }

    #[tokio::test]
    async fn test_no_history_anywhere() {
        let client = client(MemoryFetcher::new());
        assert!(matches!(
            client.fetch_job_history("ghost", 5).await,
            Err(HealthError::NoJobHistory { ref job }) if job == "ghost"
        ));
    }
}

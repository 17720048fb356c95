//! Failure processor: leaderboard failure URLs to failing test cases.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::aliases::resolve_job_regex;
use crate::client::CiHealthClient;
use crate::config::UrlLayout;
use crate::error::{HealthError, HealthResult};
use crate::period::{cutoff, parse_timestamp};
use crate::quarantine::QuarantineSet;
use crate::types::{ProcessorResult, Results, TestCase};

/// How results are presented; picks the buckets that get filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayMode {
    /// Stream each failure as it is found.
    #[default]
    Default,
    /// Stream run URLs only.
    UrlsOnly,
    /// Stream test names only.
    NamesOnly,
    /// Counts per test name.
    Counted,
    /// Failures grouped per lane run.
    GroupedByLaneRun,
    /// Aggregate summary.
    Summary,
}

/// Raw presentation flags as given on a command line or tool call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayFlags {
    pub urls_only: bool,
    pub names_only: bool,
    pub lane_run: bool,
    pub counted: bool,
    pub summary: bool,
}

impl DisplayMode {
    /// Resolve conflicting flags:
    /// urls-only, names-only, lane-run, counted, summary, then default.
    pub fn resolve(flags: DisplayFlags) -> Self {
        if flags.urls_only {
            Self::UrlsOnly
        } else if flags.names_only {
            Self::NamesOnly
        } else if flags.lane_run {
            Self::GroupedByLaneRun
        } else if flags.counted {
            Self::Counted
        } else if flags.summary {
            Self::Summary
        } else {
            Self::Default
        }
    }

    /// Modes that print failures while they are discovered.
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::Default | Self::UrlsOnly | Self::NamesOnly)
    }
}

/// Callback for streaming output.
pub type FailureSink = Arc<dyn Fn(&TestCase) + Send + Sync>;

/// Filters and presentation choices for one processing request.
#[derive(Clone)]
pub struct ProcessorConfig {
    pub job_regex: Regex,
    pub test_regex: Regex,
    pub mode: DisplayMode,
    pub show_failure_bodies: bool,
    pub check_quarantine: bool,
    pub time_period: Duration,
    pub suppress_output: bool,
    sink: Option<FailureSink>,
}

impl std::fmt::Debug for ProcessorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorConfig")
            .field("job_regex", &self.job_regex.as_str())
            .field("test_regex", &self.test_regex.as_str())
            .field("mode", &self.mode)
            .field("show_failure_bodies", &self.show_failure_bodies)
            .field("check_quarantine", &self.check_quarantine)
            .field("time_period", &self.time_period)
            .field("suppress_output", &self.suppress_output)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl ProcessorConfig {
    /// Compile the filters; `job_filter` may be an alias. Empty filters match everything.
    pub fn new(job_filter: &str, test_filter: &str) -> HealthResult<Self> {
        let job_pattern = match resolve_job_regex(job_filter) {
            "" => ".*",
            p => p,
        };
        let test_pattern = if test_filter.is_empty() { ".*" } else { test_filter };

        Ok(Self {
            job_regex: Regex::new(job_pattern).map_err(|source| HealthError::InvalidRegex {
                field: "job",
                source,
            })?,
            test_regex: Regex::new(test_pattern).map_err(|source| HealthError::InvalidRegex {
                field: "test",
                source,
            })?,
            mode: DisplayMode::Default,
            show_failure_bodies: false,
            check_quarantine: false,
            time_period: Duration::ZERO,
            suppress_output: false,
            sink: None,
        })
    }

    pub fn with_mode(mut self, mode: DisplayMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_failure_bodies(mut self, show: bool) -> Self {
        self.show_failure_bodies = show;
        self
    }

    pub fn with_quarantine_check(mut self, check: bool) -> Self {
        self.check_quarantine = check;
        self
    }

    pub fn with_time_period(mut self, period: Duration) -> Self {
        self.time_period = period;
        self
    }

    pub fn with_suppressed_output(mut self, suppress: bool) -> Self {
        self.suppress_output = suppress;
        self
    }

    /// Receiver for streamed failures in streaming modes.
    pub fn with_sink(mut self, sink: FailureSink) -> Self {
        self.sink = Some(sink);
        self
    }

    fn stream(&self, case: &TestCase) {
        if self.suppress_output || !self.mode.is_streaming() {
            return;
        }
        if let Some(sink) = &self.sink {
            sink(case);
        }
    }
}

impl ProcessorResult {
    /// Partial result for the cases found behind one failure URL.
    ///
    /// Every case lands in `failed_tests`; grouped mode also files it under
    /// its lane-run id.
    pub fn from_cases(cases: Vec<TestCase>, mode: DisplayMode, layout: &UrlLayout) -> Self {
        let mut partial = Self::default();
        for case in cases {
            if mode == DisplayMode::GroupedByLaneRun {
                if let Some(id) = layout.lane_run_id(&case.url) {
                    partial
                        .lane_run_failures
                        .entry(id.to_string())
                        .or_default()
                        .push(case.clone());
                }
            }
            partial
                .failed_tests
                .entry(case.name.clone())
                .or_default()
                .push(case);
        }
        partial
    }

    /// Append `other`, keeping per-key order.
    pub fn merge(&mut self, other: Self) {
        for (name, cases) in other.failed_tests {
            self.failed_tests.entry(name).or_default().extend(cases);
        }
        for (id, cases) in other.lane_run_failures {
            self.lane_run_failures.entry(id).or_default().extend(cases);
        }
    }
}

/// Fetch and filter the failing test cases behind every matching
/// leaderboard entry.
///
/// A missing JUnit file yields a placeholder case; any other JUnit fetch
/// error aborts. Quarantine lookup failures only disable the flag.
pub async fn process_failures(
    client: &CiHealthClient,
    results: &Results,
    config: &ProcessorConfig,
) -> HealthResult<ProcessorResult> {
    let quarantine = if config.check_quarantine {
        Some(client.fetch_quarantined_tests().await.unwrap_or_else(|e| {
            warn!(error = %e, "quarantine list unavailable, continuing without it");
            QuarantineSet::default()
        }))
    } else {
        None
    };
    let cutoff = cutoff(config.time_period, Utc::now());
    let layout = &client.config().layout;

    let mut result = ProcessorResult::default();
    let entries = results
        .leaderboard()
        .iter()
        .filter(|entry| config.job_regex.is_match(&entry.job_name));

    for entry in entries {
        debug!(job = %entry.job_name, urls = entry.failure_urls.len(), "processing job");

        for url in &entry.failure_urls {
            let meta = client.fetch_prowjob(url).await.unwrap_or_else(|e| {
                debug!(url = %url, error = %e, "prowjob metadata unavailable");
                None
            });

            let started = meta
                .as_ref()
                .and_then(|m| m.started.as_deref())
                .and_then(parse_timestamp);
            if let (Some(cutoff), Some(started)) = (cutoff, started) {
                if started < cutoff {
                    debug!(url = %url, "run outside time period");
                    continue;
                }
            }
            let job_type = meta.and_then(|m| m.job_type);

            let cases = match client.fetch_test_suite(url).await? {
                None => vec![TestCase {
                    job_type,
                    ..TestCase::missing_junit(&entry.job_name, url)
                }],
                Some(suite) => suite
                    .test_cases
                    .into_iter()
                    .filter(|tc| tc.failure.is_some() && config.test_regex.is_match(&tc.name))
                    .map(|mut tc| {
                        tc.url = url.clone();
                        tc.job_type = job_type;
                        if let Some(q) = &quarantine {
                            tc.is_quarantined = q.is_quarantined(&tc.name);
                        }
                        tc
                    })
                    .collect(),
            };

            for case in &cases {
                config.stream(case);
            }
            result.merge(ProcessorResult::from_cases(cases, config.mode, layout));
        }
    }

    info!(
        tests = result.failed_tests.len(),
        failures = result.total_failures(),
        "processed failures"
    );
    Ok(result)
}

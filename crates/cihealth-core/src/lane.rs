//! Lane analyzer: statistics over the recent runs of one job.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::classify::categorize;
use crate::client::CiHealthClient;
use crate::period::parse_timestamp;
use crate::types::{FailurePattern, JobRun, JobType, LaneSummary, RunStatus, TestCase};

/// Number of patterns kept in [`LaneSummary::top_failures`].
pub const TOP_FAILURES: usize = 5;

/// Enrich every run and summarize.
///
/// A run whose enrichment fails stays in `runs` and `total_runs` but is
/// not tallied under any status.
pub async fn analyze_lane_runs(client: &CiHealthClient, mut runs: Vec<JobRun>) -> LaneSummary {
    let mut tally = LaneTally::default();
    for run in &mut runs {
        match client.enrich_run(run).await {
            Ok(()) => tally.record(run),
            Err(e) => warn!(run = %run.id, error = %e, "skipping run"),
        }
    }
    tally.finish(runs)
}

/// Summarize runs that are already enriched.
pub fn summarize_runs(runs: Vec<JobRun>) -> LaneSummary {
    let mut tally = LaneTally::default();
    for run in &runs {
        tally.record(run);
    }
    tally.finish(runs)
}

impl LaneSummary {
    /// Same statistics restricted to runs of one job type.
    pub fn filter_by_job_type(&self, job_type: JobType) -> LaneSummary {
        summarize_runs(
            self.runs
                .iter()
                .filter(|run| run.job_type == Some(job_type))
                .cloned()
                .collect(),
        )
    }
}

/// Name to count, remembering first-seen order for stable ranking.
#[derive(Debug, Default)]
struct FailureTally {
    order: Vec<String>,
    counts: HashMap<String, usize>,
}

impl FailureTally {
    fn add(&mut self, name: &str) {
        match self.counts.get_mut(name) {
            Some(count) => *count += 1,
            None => {
                self.order.push(name.to_string());
                self.counts.insert(name.to_string(), 1);
            }
        }
    }

    fn ranked(&self, total: usize) -> Vec<FailurePattern> {
        let mut patterns: Vec<FailurePattern> = self
            .order
            .iter()
            .map(|name| {
                let count = self.counts[name];
                FailurePattern {
                    test_name: name.clone(),
                    count,
                    percentage: percentage(count, total),
                    category: categorize(name),
                }
            })
            .collect();
        // stable: ties keep first-seen order
        patterns.sort_by(|a, b| b.count.cmp(&a.count));
        patterns
    }
}

/// Running counters for [`LaneSummary`].
#[derive(Debug, Default)]
pub struct LaneTally {
    successful: usize,
    failed: usize,
    aborted: usize,
    error: usize,
    unknown: usize,
    job_types: BTreeMap<String, (usize, usize)>,
    failures: FailureTally,
    all_failures: Vec<TestCase>,
}

impl LaneTally {
    pub fn record(&mut self, run: &JobRun) {
        match run.status {
            RunStatus::Success => self.successful += 1,
            RunStatus::Failure => self.failed += 1,
            RunStatus::Aborted => self.aborted += 1,
            RunStatus::Error => self.error += 1,
            RunStatus::Pending | RunStatus::Unknown => self.unknown += 1,
        }

        if let Some(job_type) = run.job_type {
            let entry = self
                .job_types
                .entry(job_type.to_string())
                .or_insert((0, 0));
            entry.0 += 1;
            if run.status.is_failing() {
                entry.1 += 1;
            }
        }

        if !run.status.is_failing() {
            return;
        }
        if run.failures.is_empty() {
            let synthetic = TestCase::infrastructure(run.status, run);
            self.failures.add(&synthetic.name);
            self.all_failures.push(synthetic);
        } else {
            for failure in &run.failures {
                self.failures.add(&failure.name);
                self.all_failures.push(failure.clone());
            }
        }
    }

    pub fn finish(self, runs: Vec<JobRun>) -> LaneSummary {
        let total_runs = runs.len();
        let failing = self.failed + self.aborted + self.error + self.unknown;
        let total_failures = self.all_failures.len();

        let mut top_failures = self.failures.ranked(total_failures);
        top_failures.truncate(TOP_FAILURES);

        let infra = self
            .all_failures
            .iter()
            .filter(|tc| categorize(&tc.name).is_infrastructure())
            .count();

        let (first_run_time, last_run_time) = time_range(&runs);
        debug!(total_runs, failing, total_failures, "lane summarized");

        LaneSummary {
            total_runs,
            successful_runs: self.successful,
            failed_runs: self.failed,
            aborted_runs: self.aborted,
            error_runs: self.error,
            unknown_runs: self.unknown,
            failure_rate: percentage(failing, total_runs),
            job_type_stats: self
                .job_types
                .iter()
                .map(|(k, (total, _))| (k.clone(), *total))
                .collect(),
            job_type_failure_rate: self
                .job_types
                .iter()
                .map(|(k, (total, failed))| (k.clone(), percentage(*failed, *total)))
                .collect(),
            test_failures: self.failures.counts.into_iter().collect(),
            all_failures: self.all_failures,
            top_failures,
            infrastructure_failure_rate: percentage(infra, total_failures),
            first_run_time,
            last_run_time,
            runs,
        }
    }
}

/// `part / whole * 100`, zero for an empty whole.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn time_range(runs: &[JobRun]) -> (Option<String>, Option<String>) {
    let mut first: Option<(chrono::DateTime<chrono::Utc>, &str)> = None;
    let mut last: Option<(chrono::DateTime<chrono::Utc>, &str)> = None;
    for run in runs {
        let Some(raw) = run.timestamp.as_deref() else {
            continue;
        };
        let Some(ts) = parse_timestamp(raw) else {
            continue;
        };
        if first.map_or(true, |(t, _)| ts < t) {
            first = Some((ts, raw));
        }
        if last.map_or(true, |(t, _)| ts > t) {
            last = Some((ts, raw));
        }
    }
    (
        first.map(|(_, raw)| raw.to_string()),
        last.map(|(_, raw)| raw.to_string()),
    )
}

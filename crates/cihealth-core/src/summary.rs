//! Summary generators over processor and lane output.
//!
//! Everything here is pure: no I/O, no clocks.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classify::{categorize, FailureCategory};
use crate::config::UrlLayout;
use crate::lane::{percentage, TOP_FAILURES};
use crate::period::parse_timestamp;
use crate::types::{FailurePattern, JobRun, LaneSummary, ProcessorResult};

/// Examples kept per category.
const CATEGORY_EXAMPLES: usize = 3;

/// Minimum runs before a trend direction is reported.
const TREND_MIN_RUNS: usize = 5;

/// Minimum runs before flakiness is scored.
const FLAKINESS_MIN_RUNS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStat {
    pub category: FailureCategory,
    pub count: usize,
    pub percentage: f64,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobBreakdown {
    pub failure_count: usize,
    pub test_names: Vec<String>,
}

/// Overview of a [`ProcessorResult`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub total_failures: usize,
    pub unique_tests: usize,
    pub quarantined_failures: usize,
    pub top_patterns: Vec<FailurePattern>,
    pub categories: Vec<CategoryStat>,
    pub jobs: BTreeMap<String, JobBreakdown>,
    pub job_types: BTreeMap<String, usize>,
}

impl MergeSummary {
    pub fn headline(&self) -> String {
        format!(
            "Found {} total failures across {} unique tests affecting {} jobs",
            self.total_failures,
            self.unique_tests,
            self.jobs.len()
        )
    }
}

/// Summarize processor output. Failures whose URL carries no job name are
/// grouped under `unknown`.
pub fn generate_merge_summary(result: &ProcessorResult, layout: &UrlLayout) -> MergeSummary {
    let total_failures = result.total_failures();

    let mut patterns: Vec<FailurePattern> = result
        .failed_tests
        .iter()
        .map(|(name, cases)| FailurePattern {
            test_name: name.clone(),
            count: cases.len(),
            percentage: percentage(cases.len(), total_failures),
            category: categorize(name),
        })
        .collect();
    patterns.sort_by(|a, b| b.count.cmp(&a.count));
    let categories = category_breakdown(&patterns, total_failures);

    let mut jobs: BTreeMap<String, (usize, BTreeSet<String>)> = BTreeMap::new();
    let mut job_types: BTreeMap<String, usize> = BTreeMap::new();
    let mut quarantined_failures = 0;
    for tc in result.all_test_cases() {
        let job = layout.job_name(&tc.url).unwrap_or("unknown");
        let entry = jobs.entry(job.to_string()).or_default();
        entry.0 += 1;
        entry.1.insert(tc.name.clone());

        let kind = tc.job_type.map_or("unknown", |t| t.as_str());
        *job_types.entry(kind.to_string()).or_default() += 1;

        if tc.is_quarantined {
            quarantined_failures += 1;
        }
    }

    patterns.truncate(TOP_FAILURES);
    MergeSummary {
        total_failures,
        unique_tests: result.failed_tests.len(),
        quarantined_failures,
        top_patterns: patterns,
        categories,
        jobs: jobs
            .into_iter()
            .map(|(job, (failure_count, names))| {
                (
                    job,
                    JobBreakdown {
                        failure_count,
                        test_names: names.into_iter().collect(),
                    },
                )
            })
            .collect(),
        job_types,
    }
}

/// Group patterns by category, largest first.
///
/// Percentages are relative to `total`; examples keep pattern order.
pub fn category_breakdown(patterns: &[FailurePattern], total: usize) -> Vec<CategoryStat> {
    let mut by_category: BTreeMap<FailureCategory, (usize, Vec<String>)> = BTreeMap::new();
    for pattern in patterns {
        let entry = by_category.entry(pattern.category).or_default();
        entry.0 += pattern.count;
        if entry.1.len() < CATEGORY_EXAMPLES {
            entry.1.push(pattern.test_name.clone());
        }
    }

    let mut stats: Vec<CategoryStat> = by_category
        .into_iter()
        .map(|(category, (count, examples))| CategoryStat {
            category,
            count,
            percentage: percentage(count, total),
            examples,
        })
        .collect();
    stats.sort_by(|a, b| b.count.cmp(&a.count));
    stats
}

/// Health verdict for a failure rate (percent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Acceptable,
    Unstable,
    Unhealthy,
    Critical,
}

impl HealthStatus {
    pub fn from_failure_rate(rate: f64) -> Self {
        if rate > 80.0 {
            Self::Critical
        } else if rate > 50.0 {
            Self::Unhealthy
        } else if rate > 20.0 {
            Self::Unstable
        } else if rate > 5.0 {
            Self::Acceptable
        } else {
            Self::Healthy
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Acceptable => "acceptable",
            Self::Unstable => "unstable",
            Self::Unhealthy => "unhealthy",
            Self::Critical => "critical",
        }
    }

    pub fn recommendation(self) -> &'static str {
        match self {
            Self::Critical => "Immediate investigation required - systemic issues detected",
            Self::Unhealthy => "High priority investigation - significant instability",
            Self::Unstable => "Monitor trends and investigate common failures",
            Self::Acceptable | Self::Healthy => "Continue monitoring - acceptable failure rate",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stability {
    Stable,
    Moderate,
    Unstable,
}

impl Stability {
    pub fn from_failure_rate(rate: f64) -> Self {
        if rate > 50.0 {
            Self::Unstable
        } else if rate > 20.0 {
            Self::Moderate
        } else {
            Self::Stable
        }
    }
}

/// Verdicts derived from a [`LaneSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneAssessment {
    pub health: HealthStatus,
    pub stability: Stability,
    pub is_improving: bool,
    pub regression_detected: bool,
    pub recommendation: String,
    pub duration: String,
    pub period: String,
    pub summary: String,
}

pub fn assess_lane(job: &str, lane: &LaneSummary) -> LaneAssessment {
    let rate = lane.failure_rate;
    let health = HealthStatus::from_failure_rate(rate);
    let span = run_span(lane.first_run_time.as_deref(), lane.last_run_time.as_deref());
    LaneAssessment {
        health,
        stability: Stability::from_failure_rate(rate),
        is_improving: rate < 20.0,
        regression_detected: rate > 50.0,
        recommendation: health.recommendation().to_string(),
        duration: span.map_or_else(|| "unknown".to_string(), human_duration),
        period: span.map_or("unknown", period_bucket).to_string(),
        summary: format!(
            "Job {job} shows {health} health with {rate:.1}% failure rate over {} runs. {} unique tests failed with {} total failures.",
            lane.total_runs,
            lane.test_failures.len(),
            lane.all_failures.len()
        ),
    }
}

fn run_span(first: Option<&str>, last: Option<&str>) -> Option<chrono::Duration> {
    let first = parse_timestamp(first?)?;
    let last = parse_timestamp(last?)?;
    Some(last - first)
}

/// "45 minutes", "3.5 hours", "2.0 days".
pub fn human_duration(span: chrono::Duration) -> String {
    let minutes = span.num_minutes();
    let hours = span.num_seconds() as f64 / 3600.0;
    if hours < 1.0 {
        format!("{minutes} minutes")
    } else if hours < 24.0 {
        format!("{hours:.1} hours")
    } else {
        format!("{:.1} days", hours / 24.0)
    }
}

fn period_bucket(span: chrono::Duration) -> &'static str {
    if span < chrono::Duration::hours(1) {
        "< 1 hour"
    } else if span < chrono::Duration::days(1) {
        "< 1 day"
    } else {
        "> 1 day"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Degrading,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestTrend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// From the share of runs a test failed in (0..=1).
    pub fn from_rate(rate: f64) -> Self {
        if rate > 0.5 {
            Self::Critical
        } else if rate > 0.2 {
            Self::High
        } else if rate > 0.1 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlakinessAnalysis {
    pub flaky_tests: Vec<String>,
    /// Percentage of distinct failing tests that look flaky.
    pub flakiness_score: f64,
    pub pattern_detected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendFailurePattern {
    pub test_name: String,
    /// Runs the test failed in.
    pub frequency: usize,
    pub trend: TestTrend,
    pub severity: Severity,
    pub category: FailureCategory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    pub overall_failure_rate: f64,
    pub direction: TrendDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flakiness: Option<FlakinessAnalysis>,
    pub failure_patterns: Vec<TrendFailurePattern>,
    pub recommendations: Vec<String>,
}

/// Trend analysis over enriched runs ordered newest first.
///
/// The first half of `runs` is the recent window.
pub fn analyze_trends(runs: &[JobRun], include_flakiness: bool) -> TrendAnalysis {
    let total_runs = runs.len();
    let successful_runs = runs.iter().filter(|r| !r.status.is_failing()).count();
    let failed_runs = total_runs - successful_runs;
    let overall_failure_rate = percentage(failed_runs, total_runs);

    let direction = trend_direction(runs);
    let per_run = failing_tests_per_run(runs);
    let flakiness = include_flakiness.then(|| score_flakiness(&per_run));
    let failure_patterns = failure_patterns(&per_run);

    let mut recommendations = Vec::new();
    if overall_failure_rate > 20.0 {
        recommendations.push(
            "High failure rate detected - investigate infrastructure or recent changes"
                .to_string(),
        );
    }
    if direction == TrendDirection::Degrading {
        recommendations.push(
            "Degrading trend detected - review recent commits and infrastructure changes"
                .to_string(),
        );
    }
    if flakiness
        .as_ref()
        .is_some_and(|f| f.flakiness_score > 15.0)
    {
        recommendations
            .push("High flakiness detected - consider quarantining unstable tests".to_string());
    }
    if recommendations.is_empty() {
        recommendations.push("Trends appear stable - continue monitoring".to_string());
    }

    TrendAnalysis {
        total_runs,
        successful_runs,
        failed_runs,
        overall_failure_rate,
        direction,
        flakiness,
        failure_patterns,
        recommendations,
    }
}

fn trend_direction(runs: &[JobRun]) -> TrendDirection {
    if runs.len() < TREND_MIN_RUNS {
        return TrendDirection::InsufficientData;
    }
    let (recent, previous) = runs.split_at(runs.len() / 2);
    let rate = |half: &[JobRun]| {
        percentage(
            half.iter().filter(|r| r.status.is_failing()).count(),
            half.len(),
        )
    };
    let (recent, previous) = (rate(recent), rate(previous));
    if recent < previous {
        TrendDirection::Improving
    } else if recent > previous {
        TrendDirection::Degrading
    } else {
        TrendDirection::Stable
    }
}

/// Distinct failing test names of each run, in run order.
fn failing_tests_per_run(runs: &[JobRun]) -> Vec<BTreeSet<&str>> {
    runs.iter()
        .map(|run| run.failures.iter().map(|tc| tc.name.as_str()).collect())
        .collect()
}

fn score_flakiness(per_run: &[BTreeSet<&str>]) -> FlakinessAnalysis {
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    for names in per_run {
        for name in names {
            *seen.entry(*name).or_default() += 1;
        }
    }

    let flaky_tests: Vec<String> = if per_run.len() < FLAKINESS_MIN_RUNS {
        Vec::new()
    } else {
        seen.iter()
            .filter(|(_, failed_in)| {
                let rate = **failed_in as f64 / per_run.len() as f64;
                rate > 0.1 && rate < 0.9
            })
            .map(|(name, _)| name.to_string())
            .collect()
    };

    let flakiness_score = percentage(flaky_tests.len(), seen.len());
    FlakinessAnalysis {
        flaky_tests,
        flakiness_score,
        pattern_detected: flakiness_score > 20.0,
    }
}

/// Tests failing in more than one run, most frequent first.
fn failure_patterns(per_run: &[BTreeSet<&str>]) -> Vec<TrendFailurePattern> {
    let recent_len = per_run.len() / 2;
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (i, names) in per_run.iter().enumerate() {
        for name in names {
            let entry = counts.entry(*name).or_default();
            entry.0 += 1;
            if i < recent_len {
                entry.1 += 1;
            }
        }
    }

    let mut patterns: Vec<TrendFailurePattern> = counts
        .into_iter()
        .filter(|(_, (frequency, _))| *frequency > 1)
        .map(|(name, (frequency, recent))| {
            let recent_share = recent as f64 / frequency as f64;
            let trend = if recent_share > 0.6 {
                TestTrend::Increasing
            } else if recent_share < 0.4 {
                TestTrend::Decreasing
            } else {
                TestTrend::Stable
            };
            TrendFailurePattern {
                test_name: name.to_string(),
                frequency,
                trend,
                severity: Severity::from_rate(frequency as f64 / per_run.len() as f64),
                category: categorize(name),
            }
        })
        .collect();
    patterns.sort_by(|a, b| {
        b.frequency
            .cmp(&a.frequency)
            .then_with(|| a.test_name.cmp(&b.test_name))
    });
    patterns
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallTrend {
    Worsening,
    Improving,
    Stable,
}

/// Two lane summaries of the same job side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodComparison {
    pub recent_failure_rate: f64,
    pub comparison_failure_rate: f64,
    /// Recent minus comparison, in percentage points.
    pub failure_rate_change: f64,
    pub new_failures: Vec<String>,
    pub resolved_failures: Vec<String>,
    pub overall_trend: OverallTrend,
    pub analysis: String,
}

pub fn compare_periods(job: &str, recent: &LaneSummary, comparison: &LaneSummary) -> PeriodComparison {
    let change = recent.failure_rate - comparison.failure_rate;

    let new_failures: Vec<String> = recent
        .test_failures
        .keys()
        .filter(|name| !comparison.test_failures.contains_key(*name))
        .cloned()
        .collect();
    let resolved_failures: Vec<String> = comparison
        .test_failures
        .keys()
        .filter(|name| !recent.test_failures.contains_key(*name))
        .cloned()
        .collect();

    let overall_trend = if change > 10.0 {
        OverallTrend::Worsening
    } else if change < -10.0 {
        OverallTrend::Improving
    } else {
        OverallTrend::Stable
    };

    let wording = if change > 10.0 {
        "worsening significantly"
    } else if change > 0.0 {
        "slightly worsening"
    } else if change < -10.0 {
        "improving significantly"
    } else if change < 0.0 {
        "slightly improving"
    } else {
        "stable"
    };

    PeriodComparison {
        recent_failure_rate: recent.failure_rate,
        comparison_failure_rate: comparison.failure_rate,
        failure_rate_change: change,
        analysis: format!(
            "Job {job} is {wording} with {change:.1}% failure rate change. {} new failures, {} resolved failures.",
            new_failures.len(),
            resolved_failures.len()
        ),
        new_failures,
        resolved_failures,
        overall_trend,
    }
}

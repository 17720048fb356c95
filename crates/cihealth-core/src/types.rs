//! Data model shared by the fetchers, the processor and the analyzers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::classify::FailureCategory;

/// Root of the results feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Results {
    #[serde(rename = "Data", default)]
    pub data: ResultsData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultsData {
    #[serde(rename = "SIGRetests", default)]
    pub sig_retests: SigRetests,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigRetests {
    #[serde(rename = "FailedJobLeaderBoard", default)]
    pub failed_job_leader_board: Vec<LeaderboardEntry>,
}

impl Results {
    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.data.sig_retests.failed_job_leader_board
    }
}

/// One job's row in the failed-job leaderboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    #[serde(rename = "JobName")]
    pub job_name: String,
    #[serde(rename = "FailureCount", default)]
    pub failure_count: u64,
    #[serde(rename = "SuccessCount", default)]
    pub success_count: u64,
    #[serde(rename = "FailureURLs", default)]
    pub failure_urls: Vec<String>,
}

/// Failure element of a JUnit test case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub body: String,
}

/// A JUnit test case, annotated with where it came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub classname: String,
    /// Raw `time` attribute.
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<JobType>,
    #[serde(default)]
    pub is_quarantined: bool,
}

impl TestCase {
    /// Stand-in for a run that produced no JUnit artifact.
    pub fn missing_junit(job_name: &str, url: &str) -> Self {
        Self {
            name: format!("{job_name} (no junit file to parse)"),
            url: url.to_string(),
            ..Self::default()
        }
    }

    /// Synthetic entry for a failing run that yielded no failing test case.
    pub fn infrastructure(status: RunStatus, run: &JobRun) -> Self {
        Self {
            name: format!("Infrastructure failure ({status})"),
            classname: "infrastructure".to_string(),
            failure: Some(Failure {
                message: format!("Job failed with status: {status}"),
                kind: "infrastructure".to_string(),
                body: String::new(),
            }),
            url: run.url.clone(),
            job_type: run.job_type,
            ..Self::default()
        }
    }

    pub fn failure_message(&self) -> &str {
        self.failure.as_ref().map_or("", |f| f.message.as_str())
    }
}

/// Parsed JUnit document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestSuite {
    pub name: String,
    pub tests: u64,
    pub failures: u64,
    pub errors: u64,
    pub skipped: u64,
    pub test_cases: Vec<TestCase>,
}

impl TestSuite {
    pub fn failed_cases(&self) -> impl Iterator<Item = &TestCase> {
        self.test_cases.iter().filter(|tc| tc.failure.is_some())
    }
}

/// Terminal (or not yet terminal) state of a prow job run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Success,
    Failure,
    Aborted,
    Error,
    Pending,
    #[default]
    Unknown,
}

impl RunStatus {
    /// Map a prowjob `status.state` value.
    pub fn from_prow_state(state: &str) -> Self {
        match state {
            "success" => Self::Success,
            "failure" => Self::Failure,
            "aborted" => Self::Aborted,
            "error" => Self::Error,
            "pending" | "triggered" => Self::Pending,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Aborted => "ABORTED",
            Self::Error => "ERROR",
            Self::Pending => "PENDING",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Everything but SUCCESS counts against the lane.
    pub fn is_failing(self) -> bool {
        self != Self::Success
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prow job type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Presubmit,
    Postsubmit,
    Periodic,
    Batch,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Presubmit => "presubmit",
            Self::Postsubmit => "postsubmit",
            Self::Periodic => "periodic",
            Self::Batch => "batch",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "presubmit" => Ok(Self::Presubmit),
            "postsubmit" => Ok(Self::Postsubmit),
            "periodic" => Ok(Self::Periodic),
            "batch" => Ok(Self::Batch),
            other => Err(format!(
                "unknown job type '{other}' (expected presubmit, postsubmit, periodic or batch)"
            )),
        }
    }
}

/// Pull request a presubmit run was testing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    pub author: String,
    pub sha: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub head_ref: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub commit_link: String,
    #[serde(default)]
    pub author_link: String,
    #[serde(default)]
    pub base_sha: String,
    /// Author differs from the repository org.
    #[serde(default)]
    pub is_fork: bool,
}

/// One execution of a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub id: String,
    pub url: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<JobType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub failures: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestRef>,
}

impl JobRun {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Recurring failure with its share of all failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePattern {
    pub test_name: String,
    pub count: usize,
    pub percentage: f64,
    pub category: FailureCategory,
}

/// Aggregate statistics over a set of runs of one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaneSummary {
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    pub aborted_runs: usize,
    pub error_runs: usize,
    pub unknown_runs: usize,
    pub failure_rate: f64,
    pub job_type_stats: BTreeMap<String, usize>,
    pub job_type_failure_rate: BTreeMap<String, f64>,
    pub test_failures: BTreeMap<String, usize>,
    pub all_failures: Vec<TestCase>,
    pub top_failures: Vec<FailurePattern>,
    pub infrastructure_failure_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_run_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_time: Option<String>,
    pub runs: Vec<JobRun>,
}

impl LaneSummary {
    pub fn failing_runs(&self) -> usize {
        self.failed_runs + self.aborted_runs + self.error_runs + self.unknown_runs
    }
}

/// Output of the failure processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessorResult {
    /// Test name to every failing occurrence.
    pub failed_tests: BTreeMap<String, Vec<TestCase>>,
    /// Lane-run id (last URL segment) to the failures seen in that run.
    pub lane_run_failures: BTreeMap<String, Vec<TestCase>>,
}

impl ProcessorResult {
    pub fn total_failures(&self) -> usize {
        self.failed_tests.values().map(Vec::len).sum()
    }

    pub fn all_test_cases(&self) -> impl Iterator<Item = &TestCase> {
        self.failed_tests.values().flatten()
    }
}

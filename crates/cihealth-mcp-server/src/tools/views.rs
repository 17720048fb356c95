//! Response shapes shared by several tools.

use cihealth_core::{
    potential_causes, FailureCategory, FailurePattern, LaneAssessment, LaneSummary,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct TimeRange {
    pub start: Option<String>,
    pub end: Option<String>,
    pub duration: String,
    pub period: String,
}

impl TimeRange {
    pub fn new(lane: &LaneSummary, assessment: &LaneAssessment) -> Self {
        Self {
            start: lane.first_run_time.clone(),
            end: lane.last_run_time.clone(),
            duration: assessment.duration.clone(),
            period: assessment.period.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunStatistics {
    pub total_runs: usize,
    pub successful: usize,
    pub failed: usize,
    pub unknown: usize,
    #[serde(rename = "failure_rate_percent")]
    pub failure_rate: f64,
    #[serde(rename = "total_test_failures")]
    pub total_failures: usize,
    #[serde(rename = "unique_failing_tests")]
    pub unique_tests: usize,
}

impl From<&LaneSummary> for RunStatistics {
    fn from(lane: &LaneSummary) -> Self {
        Self {
            total_runs: lane.total_runs,
            successful: lane.successful_runs,
            failed: lane.failed_runs,
            unknown: lane
                .total_runs
                .saturating_sub(lane.successful_runs + lane.failed_runs),
            failure_rate: lane.failure_rate,
            total_failures: lane.all_failures.len(),
            unique_tests: lane.test_failures.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PatternView {
    pub test_name: String,
    pub failure_count: usize,
    pub percentage: f64,
    pub category: FailureCategory,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub potential_causes: Vec<&'static str>,
}

impl From<&FailurePattern> for PatternView {
    fn from(p: &FailurePattern) -> Self {
        Self {
            test_name: p.test_name.clone(),
            failure_count: p.count,
            percentage: p.percentage,
            category: p.category,
            potential_causes: potential_causes(&p.test_name),
        }
    }
}

pub fn patterns(top: &[FailurePattern]) -> Vec<PatternView> {
    top.iter().map(PatternView::from).collect()
}

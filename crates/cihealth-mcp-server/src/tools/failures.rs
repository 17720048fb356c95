use std::collections::BTreeMap;

use super::views::PatternView;
use super::{bool_arg, required_str, u64_arg, ToolContext, ToolError};
use anyhow::Result;
use cihealth_core::lane::percentage;
use cihealth_core::{
    analyze_lane_runs, categorize, FailureCategory, FailurePattern, JobRun, RunStatus, TestCase,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
struct TestFailureView {
    test_name: String,
    category: FailureCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack_trace: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    error_message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    duration: String,
}

#[derive(Debug, Serialize)]
struct RunView {
    run_id: String,
    url: String,
    status: RunStatus,
    timestamp: Option<String>,
    failure_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<TestFailureView>,
}

#[derive(Debug, Serialize)]
struct FailureSummary {
    total_runs: usize,
    failed_runs: usize,
    common_failures: Vec<PatternView>,
    failures_by_run: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
struct JobFailures {
    job_name: String,
    runs: Vec<RunView>,
    summary: FailureSummary,
}

/// Failure message, or the first non-empty line of the body.
fn error_message(tc: &TestCase) -> String {
    let Some(failure) = &tc.failure else {
        return String::new();
    };
    if !failure.message.is_empty() {
        return failure.message.clone();
    }
    failure
        .body
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn run_view(run: &JobRun, include_stack_traces: bool) -> RunView {
    RunView {
        run_id: run.id.clone(),
        url: run.url.clone(),
        status: run.status,
        timestamp: run.timestamp.clone(),
        failure_count: run.failures.len(),
        failures: run
            .failures
            .iter()
            .map(|tc| TestFailureView {
                test_name: tc.name.clone(),
                category: categorize(&tc.name),
                stack_trace: include_stack_traces
                    .then(|| tc.failure.as_ref().map(|f| f.body.clone()))
                    .flatten()
                    .filter(|b| !b.is_empty()),
                error_message: error_message(tc),
                duration: tc.time.clone(),
            })
            .collect(),
    }
}

/// Tests failing in more than one run, most frequent first.
fn common_failures(runs: &[JobRun]) -> Vec<PatternView> {
    let total: usize = runs.iter().map(|r| r.failures.len()).sum();
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for tc in runs.iter().flat_map(|r| &r.failures) {
        *counts.entry(tc.name.as_str()).or_default() += 1;
    }

    let mut common: Vec<FailurePattern> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, count)| FailurePattern {
            test_name: name.to_string(),
            count,
            percentage: percentage(count, total),
            category: categorize(name),
        })
        .collect();
    common.sort_by(|a, b| b.count.cmp(&a.count));
    common.iter().map(PatternView::from).collect()
}

pub async fn get_job_failures(ctx: &ToolContext, args: &Value) -> Result<Value> {
    let job = required_str(args, "job_name")?;
    let limit = (u64_arg(args, "limit", 10) as usize).clamp(1, ctx.cfg.max_job_runs);
    let include_stack_traces = bool_arg(args, "include_stack_traces", false);

    let runs = match ctx.client.fetch_job_history(job, limit).await {
        Ok(runs) => runs,
        Err(e) => return ToolError::from_health(&e).result(),
    };
    let lane = analyze_lane_runs(&ctx.client, runs).await;

    let response = JobFailures {
        job_name: job.to_string(),
        runs: lane
            .runs
            .iter()
            .map(|run| run_view(run, include_stack_traces))
            .collect(),
        summary: FailureSummary {
            total_runs: lane.total_runs,
            failed_runs: lane.failed_runs,
            common_failures: common_failures(&lane.runs),
            failures_by_run: lane
                .runs
                .iter()
                .map(|run| (run.id.clone(), run.failures.len()))
                .collect(),
        },
    };
    Ok(serde_json::to_value(response)?)
}

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use super::views::{patterns, PatternView};
use super::{bool_arg, required_str, str_arg, ToolContext, ToolError};
use anyhow::Result;
use cihealth_core::summary::{CategoryStat, JobBreakdown};
use cihealth_core::{
    generate_merge_summary, process_failures, DisplayMode, ProcessorConfig, ProcessorResult,
    TestCase, UrlLayout,
};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

/// Characters of a matching failure line kept as context.
const CONTEXT_CHARS: usize = 200;

#[derive(Debug, Serialize)]
struct Filter {
    job_filter: String,
    test_filter: String,
}

#[derive(Debug, Serialize)]
struct MergeStatistics {
    total_failures: usize,
    unique_tests: usize,
    affected_jobs: usize,
    quarantined_tests: usize,
}

#[derive(Debug, Serialize)]
struct MergeAnalysis {
    filter: Filter,
    statistics: MergeStatistics,
    top_failures: Vec<PatternView>,
    by_job: BTreeMap<String, JobBreakdown>,
    categories: Vec<CategoryStat>,
    job_types: BTreeMap<String, usize>,
    summary: String,
}

pub async fn analyze_merge_failures(ctx: &ToolContext, args: &Value) -> Result<Value> {
    let job_filter = str_arg(args, "job_filter", ".*");
    let test_filter = str_arg(args, "test_filter", ".*");
    let include_quarantined = bool_arg(args, "include_quarantined", true);

    let config = match ProcessorConfig::new(job_filter, test_filter) {
        Ok(c) => c
            .with_mode(DisplayMode::Counted)
            .with_quarantine_check(include_quarantined),
        Err(e) => return ToolError::from_health(&e).result(),
    };
    let result = match leaderboard_failures(ctx, &config).await {
        Ok(r) => r,
        Err(e) => return e.result(),
    };

    let summary = generate_merge_summary(&result, &ctx.client.config().layout);
    let analysis = MergeAnalysis {
        filter: Filter {
            job_filter: job_filter.to_string(),
            test_filter: test_filter.to_string(),
        },
        statistics: MergeStatistics {
            total_failures: summary.total_failures,
            unique_tests: summary.unique_tests,
            affected_jobs: summary.jobs.len(),
            quarantined_tests: summary.quarantined_failures,
        },
        top_failures: patterns(&summary.top_patterns),
        summary: summary.headline(),
        by_job: summary.jobs,
        categories: summary.categories,
        job_types: summary.job_types,
    };
    Ok(serde_json::to_value(analysis)?)
}

async fn leaderboard_failures(
    ctx: &ToolContext,
    config: &ProcessorConfig,
) -> std::result::Result<ProcessorResult, ToolError> {
    let results = ctx
        .results()
        .await
        .map_err(|e| ToolError::from_health(&e))?;
    process_failures(&ctx.client, &results, config)
        .await
        .map_err(|e| ToolError::from_health(&e))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchIn {
    TestNames,
    FailureMessages,
    Both,
}

impl FromStr for SearchIn {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "test_names" => Ok(Self::TestNames),
            "failure_messages" => Ok(Self::FailureMessages),
            "both" => Ok(Self::Both),
            other => Err(format!(
                "invalid search_in '{other}' (expected test_names, failure_messages or both)"
            )),
        }
    }
}

#[derive(Debug, Serialize)]
struct PatternMatch {
    test_name: String,
    job_name: String,
    url: String,
    context: String,
}

#[derive(Debug, Default, Serialize)]
struct PatternStatistics {
    total_matches: usize,
    unique_tests: usize,
    affected_jobs: usize,
    by_job: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
struct PatternSearch {
    pattern: String,
    search_in: String,
    matches: Vec<PatternMatch>,
    truncated: bool,
    statistics: PatternStatistics,
    summary: String,
}

fn match_case(re: &Regex, tc: &TestCase, search_in: SearchIn) -> Option<String> {
    if search_in != SearchIn::FailureMessages && re.is_match(&tc.name) {
        return Some("test name match".to_string());
    }
    if search_in == SearchIn::TestNames {
        return None;
    }
    let failure = tc.failure.as_ref()?;
    if re.is_match(&failure.message) {
        return Some(truncate(&failure.message));
    }
    failure
        .body
        .lines()
        .map(str::trim)
        .find(|line| re.is_match(line))
        .map(truncate)
}

fn truncate(line: &str) -> String {
    line.chars().take(CONTEXT_CHARS).collect()
}

fn search(
    re: &Regex,
    result: &ProcessorResult,
    search_in: SearchIn,
    layout: &UrlLayout,
) -> (Vec<PatternMatch>, PatternStatistics) {
    let mut matches = Vec::new();
    let mut stats = PatternStatistics::default();
    let mut tests = BTreeSet::new();

    for tc in result.all_test_cases() {
        let Some(context) = match_case(re, tc, search_in) else {
            continue;
        };
        let job_name = layout.job_name(&tc.url).unwrap_or("unknown").to_string();
        tests.insert(tc.name.clone());
        *stats.by_job.entry(job_name.clone()).or_default() += 1;
        matches.push(PatternMatch {
            test_name: tc.name.clone(),
            job_name,
            url: tc.url.clone(),
            context,
        });
    }

    stats.total_matches = matches.len();
    stats.unique_tests = tests.len();
    stats.affected_jobs = stats.by_job.len();
    (matches, stats)
}

pub async fn search_failure_patterns(ctx: &ToolContext, args: &Value) -> Result<Value> {
    let pattern = required_str(args, "pattern")?;
    let job_filter = str_arg(args, "job_filter", ".*");
    let search_in_raw = str_arg(args, "search_in", "test_names");

    let search_in = match search_in_raw.parse::<SearchIn>() {
        Ok(s) => s,
        Err(msg) => return ToolError::new("E_INVALID_INPUT", &msg).result(),
    };
    let re = match Regex::new(&format!("(?i){pattern}")) {
        Ok(re) => re,
        Err(e) => {
            return ToolError::new("E_INVALID_REGEX", &format!("invalid pattern regex: {e}"))
                .result()
        }
    };
    let config = match ProcessorConfig::new(job_filter, "") {
        Ok(c) => c.with_mode(DisplayMode::Counted),
        Err(e) => return ToolError::from_health(&e).result(),
    };
    let result = match leaderboard_failures(ctx, &config).await {
        Ok(r) => r,
        Err(e) => return e.result(),
    };

    let (mut matches, statistics) = search(&re, &result, search_in, &ctx.client.config().layout);
    let truncated = matches.len() > ctx.cfg.max_search_matches;
    matches.truncate(ctx.cfg.max_search_matches);

    let response = PatternSearch {
        pattern: pattern.to_string(),
        search_in: search_in_raw.to_string(),
        summary: format!(
            "Found {} matches for pattern '{}' across {} unique tests in {} jobs",
            statistics.total_matches, pattern, statistics.unique_tests, statistics.affected_jobs
        ),
        matches,
        truncated,
        statistics,
    };
    Ok(serde_json::to_value(response)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cihealth_core::Failure;

    fn case(name: &str, url: &str, message: &str, body: &str) -> TestCase {
        TestCase {
            name: name.into(),
            url: url.into(),
            failure: Some(Failure {
                message: message.into(),
                kind: String::new(),
                body: body.into(),
            }),
            ..TestCase::default()
        }
    }

    fn result() -> ProcessorResult {
        let url = "https://prow.ci.kubevirt.io/view/gs/kubevirt-prow/pr-logs/pull/kubevirt_kubevirt/1/pull-kubevirt-e2e-sig-network/9";
        ProcessorResult::from_cases(
            vec![
                case("[sig-network] bridge binding", url, "", "tests/net.go:10\nconnection refused"),
                case("[sig-compute] VMI start", url, "Timed out after 300s", ""),
            ],
            DisplayMode::Counted,
            &UrlLayout::default(),
        )
    }

    #[test]
    fn test_search_in_parsing() {
        assert_eq!("both".parse::<SearchIn>(), Ok(SearchIn::Both));
        assert!("everything".parse::<SearchIn>().is_err());
    }

    #[test]
    fn test_search_names_only() {
        let re = Regex::new("(?i)BRIDGE").unwrap();
        let (matches, stats) = search(&re, &result(), SearchIn::TestNames, &UrlLayout::default());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].context, "test name match");
        assert_eq!(matches[0].job_name, "pull-kubevirt-e2e-sig-network");
        assert_eq!(stats.affected_jobs, 1);
    }

    #[test]
    fn test_search_failure_messages() {
        let re = Regex::new("(?i)refused|timed out").unwrap();
        let (matches, stats) =
            search(&re, &result(), SearchIn::FailureMessages, &UrlLayout::default());
        let contexts: BTreeSet<&str> = matches.iter().map(|m| m.context.as_str()).collect();
        assert_eq!(
            contexts,
            BTreeSet::from(["connection refused", "Timed out after 300s"])
        );
        assert_eq!(stats.unique_tests, 2);

        let none = search(&re, &result(), SearchIn::TestNames, &UrlLayout::default());
        assert!(none.0.is_empty());
    }
}

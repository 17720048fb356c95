//! Tool handlers. Each takes the JSON `arguments` object of a `tools/call`
//! and returns the structured result; expected failures come back as
//! [`ToolError`] payloads rather than `Err`.

use std::time::Duration;

use anyhow::{Context, Result};
use cihealth_core::{analyze_lane_runs, CiHealthClient, HealthError, HealthResult, LaneSummary};
use serde_json::{json, Value};

use crate::cache::{ResultsCache, SharedResults};
use crate::config::ServerConfig;

mod failures;
mod lane;
mod merge;
mod source;
mod views;

/// Shared state handed to every tool call.
pub struct ToolContext {
    pub client: CiHealthClient,
    pub cfg: ServerConfig,
    cache: ResultsCache,
}

impl ToolContext {
    pub fn new(client: CiHealthClient, cfg: ServerConfig) -> Self {
        let cache = ResultsCache::new(16, cfg.results_ttl);
        Self { client, cfg, cache }
    }

    /// Results feed, served from cache while fresh.
    pub async fn results(&self) -> HealthResult<SharedResults> {
        let url = self.client.config().results_url.clone();
        if let Some(hit) = self.cache.get(&url) {
            tracing::debug!(url = %url, "results cache hit");
            return Ok(hit);
        }
        let fresh = SharedResults::new(self.client.fetch_results().await?);
        self.cache.insert(&url, fresh.clone());
        Ok(fresh)
    }

    /// Fetch and analyze the runs of `job` within `period`.
    pub async fn lane(&self, job: &str, period: Duration, max_runs: usize) -> HealthResult<LaneSummary> {
        let runs = self
            .client
            .fetch_job_history_with_time_period(job, period, max_runs)
            .await?;
        Ok(analyze_lane_runs(&self.client, runs).await)
    }
}

/// Tool-level failure reported back to the caller as `isError: true`.
#[derive(Debug)]
pub struct ToolError {
    pub code: &'static str,
    pub message: String,
}

impl ToolError {
    pub fn new(code: &'static str, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }

    pub fn from_health(err: &HealthError) -> Self {
        let code = match err {
            HealthError::InvalidTimePeriod { .. } => "E_INVALID_PERIOD",
            HealthError::InvalidRegex { .. } => "E_INVALID_REGEX",
            HealthError::Http { status: 404, .. } => "E_NOT_FOUND",
            HealthError::Http { .. } | HealthError::Network { .. } => "E_FETCH",
            HealthError::Parse { .. } => "E_PARSE",
            HealthError::NoJobHistory { .. } => "E_NO_HISTORY",
            HealthError::Config { .. } => "E_CONFIG",
        };
        Self {
            code,
            message: err.to_string(),
        }
    }

    pub fn result(self) -> Result<Value> {
        Ok(json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        }))
    }
}

pub(crate) fn required_str<'a>(args: &'a Value, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .with_context(|| format!("Missing '{name}' argument"))
}

pub(crate) fn str_arg<'a>(args: &'a Value, name: &str, default: &'a str) -> &'a str {
    args.get(name).and_then(|v| v.as_str()).unwrap_or(default)
}

pub(crate) fn bool_arg(args: &Value, name: &str, default: bool) -> bool {
    args.get(name).and_then(|v| v.as_bool()).unwrap_or(default)
}

pub(crate) fn u64_arg(args: &Value, name: &str, default: u64) -> u64 {
    args.get(name)
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
        .unwrap_or(default)
}

/// Run the named tool. `None` when no tool has that name.
pub async fn call(ctx: &ToolContext, name: &str, args: &Value) -> Option<Result<Value>> {
    let out = match name {
        "analyze_job_lane" => lane::analyze_job_lane(ctx, args).await,
        "compare_time_periods" => lane::compare_time_periods(ctx, args).await,
        "analyze_failure_trends" => lane::analyze_failure_trends(ctx, args).await,
        "get_job_failures" => failures::get_job_failures(ctx, args).await,
        "analyze_merge_failures" => merge::analyze_merge_failures(ctx, args).await,
        "search_failure_patterns" => merge::search_failure_patterns(ctx, args).await,
        "get_failure_source_context" => source::get_failure_source_context(ctx, args).await,
        "get_build_log_context" => source::get_build_log_context(ctx, args).await,
        _ => return None,
    };
    Some(out)
}

/// `tools/list` entries.
pub fn definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "analyze_job_lane",
            "description": "Analyze recent job runs for a specific CI lane with failure patterns and statistics",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "job_name": { "type": "string", "description": "Name of the CI job to analyze" },
                    "since": { "type": "string", "description": "Time period to analyze (e.g. '24h', '7d', '1w')", "default": "24h" },
                    "include_details": { "type": "boolean", "description": "Include top failures and categories", "default": true }
                },
                "required": ["job_name"]
            }
        }),
        json!({
            "name": "get_job_failures",
            "description": "Get detailed failure information for the most recent runs of a job",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "job_name": { "type": "string", "description": "Name of the CI job" },
                    "limit": { "type": "number", "description": "Number of recent runs to analyze", "default": 10, "minimum": 1, "maximum": 100 },
                    "include_stack_traces": { "type": "boolean", "description": "Include failure bodies", "default": false }
                },
                "required": ["job_name"]
            }
        }),
        json!({
            "name": "analyze_merge_failures",
            "description": "Analyze test failures across all merge-time jobs on the ci-health leaderboard",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "job_filter": { "type": "string", "description": "Job filter regex or alias (compute, network, storage, main, ...)", "default": ".*" },
                    "test_filter": { "type": "string", "description": "Test name filter regex", "default": ".*" },
                    "include_quarantined": { "type": "boolean", "description": "Mark quarantined tests", "default": true }
                }
            }
        }),
        json!({
            "name": "search_failure_patterns",
            "description": "Search leaderboard failures for a pattern in test names or failure messages",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "description": "Case-insensitive regex to search for" },
                    "job_filter": { "type": "string", "description": "Job filter regex or alias", "default": ".*" },
                    "search_in": { "type": "string", "enum": ["test_names", "failure_messages", "both"], "default": "test_names" }
                },
                "required": ["pattern"]
            }
        }),
        json!({
            "name": "compare_time_periods",
            "description": "Compare failure rates between two time periods for a job",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "job_name": { "type": "string", "description": "Name of the CI job to analyze" },
                    "recent_period": { "type": "string", "description": "Recent time period (e.g. '24h', '7d')", "default": "24h" },
                    "comparison_period": { "type": "string", "description": "Comparison time period (e.g. '7d', '14d')", "default": "7d" }
                },
                "required": ["job_name"]
            }
        }),
        json!({
            "name": "analyze_failure_trends",
            "description": "Analyze failure trends, flakiness and recurring failures over a time period",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "job_name": { "type": "string", "description": "Name of the CI job to analyze" },
                    "trend_period": { "type": "string", "description": "Time period for trend analysis (e.g. '7d', '14d')", "default": "14d" },
                    "include_flakiness": { "type": "boolean", "description": "Include flakiness analysis", "default": true }
                },
                "required": ["job_name"]
            }
        }),
        json!({
            "name": "get_failure_source_context",
            "description": "Parse JUnit failure output and link the referenced source lines on GitHub",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "failure_text": { "type": "string", "description": "JUnit failure text containing file paths and line numbers" },
                    "job_url": { "type": "string", "description": "Run URL used to resolve repository and commit" },
                    "include_stack_trace": { "type": "boolean", "description": "Link stack frames as well", "default": true }
                },
                "required": ["failure_text", "job_url"]
            }
        }),
        json!({
            "name": "get_build_log_context",
            "description": "Fetch the relevant tail of a run's build log",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "job_url": { "type": "string", "description": "Run URL whose build-log.txt is read" }
                },
                "required": ["job_url"]
            }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_cover_dispatch() {
        let defs = definitions();
        let names: std::collections::BTreeSet<&str> =
            defs.iter().filter_map(|d| d["name"].as_str()).collect();
        assert_eq!(names.len(), 8);
        assert!(names.contains("get_build_log_context"));
        for def in &defs {
            assert_eq!(def["inputSchema"]["type"], "object");
        }
    }

    #[test]
    fn test_arg_helpers() {
        let args = json!({ "job_name": "pull-a", "empty": "", "limit": 7.0, "flag": false });
        assert_eq!(required_str(&args, "job_name").unwrap(), "pull-a");
        let err = required_str(&args, "empty").unwrap_err();
        assert_eq!(err.to_string(), "Missing 'empty' argument");
        assert!(required_str(&args, "nope").is_err());

        assert_eq!(str_arg(&args, "since", "24h"), "24h");
        assert_eq!(u64_arg(&args, "limit", 10), 7);
        assert_eq!(u64_arg(&args, "other", 10), 10);
        assert!(!bool_arg(&args, "flag", true));
        assert!(bool_arg(&args, "missing", true));
    }

    #[test]
    fn test_tool_error_codes() {
        let err = HealthError::NoJobHistory {
            job: "pull-a".into(),
        };
        let value = ToolError::from_health(&err).result().unwrap();
        assert_eq!(value["error"]["code"], "E_NO_HISTORY");
        assert_eq!(value["error"]["message"], "no job history found for pull-a");

        let missing = HealthError::Http {
            url: "u".into(),
            status: 404,
        };
        assert_eq!(ToolError::from_health(&missing).code, "E_NOT_FOUND");
    }
}

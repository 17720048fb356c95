//! CI failure aggregation for prow-driven projects.
//!
//! This crate reads the ci-health results feed, prow job history and JUnit
//! artifacts, providing:
//!
//! - Failure processing over the failed-job leaderboard, with job and test
//!   regex filters and several grouping modes
//! - Multi-source job history (presubmit, batch, periodic) with pagination
//!   and time windows
//! - Lane statistics, failure patterns and trend analysis
//! - Source and build-log context for individual failures
//!
//! # Quick Start
//!
//! ```no_run
//! use cihealth_core::{process_failures, CiHealthClient, ProcessorConfig};
//!
//! # async fn example() -> Result<(), cihealth_core::HealthError> {
//! let client = CiHealthClient::from_env()?;
//! let results = client.fetch_results().await?;
//!
//! let config = ProcessorConfig::new("compute", "Migration")?;
//! let result = process_failures(&client, &results, &config).await?;
//! println!("{} failures", result.total_failures());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `CIHEALTH_RESULTS_URL` | Results feed (default: kubevirt ci-health `results.json`) |
//! | `CIHEALTH_QUARANTINE_URL` | Quarantined-tests report |
//! | `CIHEALTH_PROW_URL` | Prow deck base URL |
//! | `CIHEALTH_GCSWEB_URL` | gcsweb base URL |
//! | `CIHEALTH_GCS_URL` | Artifact storage base URL |
//! | `CIHEALTH_BUCKET` | Artifact bucket (default: `kubevirt-prow`) |
//! | `CIHEALTH_TIMEOUT` | Request timeout in seconds (default: 60) |
//! | `CIHEALTH_CONNECT_TIMEOUT` | Connect timeout in seconds (default: 15) |

pub mod aliases;
pub mod build_log;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod history;
pub mod junit;
pub mod lane;
pub mod period;
pub mod processor;
pub mod prowjob;
pub mod quarantine;
pub mod source_context;
pub mod summary;
pub mod types;

// Re-export main types
pub use aliases::{resolve_job_regex, JOB_REGEX_ALIASES};
pub use build_log::extract_build_log_context;
pub use classify::{categorize, potential_causes, FailureCategory};
pub use client::CiHealthClient;
pub use config::{HealthConfig, UrlLayout};
pub use error::{HealthError, HealthResult};
pub use fetch::{FetchOutcome, Fetcher, HttpFetcher};
pub use history::{HistoryBuild, HistorySource};
pub use lane::{analyze_lane_runs, summarize_runs};
pub use period::parse_time_period;
pub use processor::{
    process_failures, DisplayFlags, DisplayMode, FailureSink, ProcessorConfig,
};
pub use quarantine::QuarantineSet;
pub use source_context::{parse_failure_text, repository_info, FailureInfo, SourceContext};
pub use summary::{
    analyze_trends, assess_lane, category_breakdown, compare_periods, generate_merge_summary,
    HealthStatus, LaneAssessment, MergeSummary, PeriodComparison, Stability, TrendAnalysis,
    TrendDirection,
};
pub use types::{
    Failure, FailurePattern, JobRun, JobType, LaneSummary, LeaderboardEntry, ProcessorResult,
    PullRequestRef, Results, RunStatus, TestCase, TestSuite,
};

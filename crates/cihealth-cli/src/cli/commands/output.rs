//! Text and JSON renderers for `merge` and `lane`.
//!
//! Text goes to any `io::Write` so tests can render into a buffer; JSON
//! builders return a `serde_json::Value` for the caller to pretty-print.

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde_json::{json, Value};

use cihealth_core::lane::percentage;
use cihealth_core::period::parse_timestamp;
use cihealth_core::summary::human_duration;
use cihealth_core::{
    category_breakdown, DisplayMode, FailurePattern, LaneSummary, MergeSummary, ProcessorResult,
    RunStatus, TestCase,
};

const SUMMARY_NAME_WIDTH: usize = 60;
const SUMMARY_JOB_WIDTH: usize = 50;
const MERGE_TOP_TESTS: usize = 5;
const MERGE_TOP_JOBS: usize = 5;
const LANE_TOP_TESTS: usize = 3;

/// Shorten to `max` characters, ending in `...`.
pub(crate) fn truncate(name: &str, max: usize) -> String {
    if name.chars().count() <= max {
        return name.to_string();
    }
    let mut short: String = name.chars().take(max.saturating_sub(3)).collect();
    short.push_str("...");
    short
}

/// Failure text shown with `--failures`: the body, else the message.
fn failure_text(tc: &TestCase) -> Option<&str> {
    let failure = tc.failure.as_ref()?;
    [failure.body.trim(), failure.message.trim()]
        .into_iter()
        .find(|s| !s.is_empty())
}

/// One streamed failure, printed while processing is still running.
pub(crate) fn write_streamed<W: Write>(
    w: &mut W,
    mode: DisplayMode,
    show_failures: bool,
    tc: &TestCase,
) -> io::Result<()> {
    match mode {
        DisplayMode::UrlsOnly => writeln!(w, "{}", tc.url),
        DisplayMode::NamesOnly => writeln!(w, "{}", tc.name),
        _ => write_failure_entry(w, show_failures, tc),
    }
}

fn write_failure_entry<W: Write>(w: &mut W, show_failures: bool, tc: &TestCase) -> io::Result<()> {
    writeln!(w, "{}", tc.name)?;
    if show_failures {
        if let Some(text) = failure_text(tc) {
            write!(w, "{text}\n\n")?;
        }
    }
    write!(w, "{}\n\n", tc.url)
}

/// Keys ordered by group size, largest first; ties keep name order.
fn by_size<'a>(groups: &'a BTreeMap<String, Vec<TestCase>>) -> Vec<(&'a String, &'a Vec<TestCase>)> {
    let mut ordered: Vec<_> = groups.iter().collect();
    ordered.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    ordered
}

/// Tests with their occurrence count, most frequent first.
pub(crate) fn write_counted<W: Write>(
    w: &mut W,
    failed_tests: &BTreeMap<String, Vec<TestCase>>,
    show_failures: bool,
) -> io::Result<()> {
    for (name, cases) in by_size(failed_tests) {
        let marker = if cases.iter().any(|tc| tc.is_quarantined) {
            "[QUARANTINED] "
        } else {
            ""
        };
        write!(w, "{}\t{marker}{name}\n\n", cases.len())?;
        for tc in cases {
            if show_failures {
                if let Some(text) = failure_text(tc) {
                    write!(w, "\t{text}\n\n")?;
                }
            }
            write!(w, "\t{}\n\n", tc.url)?;
        }
        writeln!(w)?;
    }
    Ok(())
}

/// Failures grouped per lane run, busiest run first.
pub(crate) fn write_lane_runs<W: Write>(
    w: &mut W,
    lane_run_failures: &BTreeMap<String, Vec<TestCase>>,
    show_failures: bool,
) -> io::Result<()> {
    for (run, cases) in by_size(lane_run_failures) {
        write!(w, "Lane Run {run} ({} failures)\n\n", cases.len())?;
        for tc in cases {
            if tc.is_quarantined {
                writeln!(w, "\t[QUARANTINED] {}", tc.name)?;
            } else {
                writeln!(w, "\t{}", tc.name)?;
            }
            if show_failures {
                if let Some(text) = failure_text(tc) {
                    write!(w, "\t{text}\n\n")?;
                }
            }
            write!(w, "\t{}\n\n", tc.url)?;
        }
        writeln!(w)?;
    }
    Ok(())
}

fn write_top_patterns<W: Write>(w: &mut W, patterns: &[FailurePattern], limit: usize) -> io::Result<()> {
    writeln!(w, "Most Frequent Failures:")?;
    for (i, p) in patterns.iter().take(limit).enumerate() {
        writeln!(
            w,
            "  {}. [{}] {} ({} failures, {:.1}%)",
            i + 1,
            p.category,
            truncate(&p.test_name, SUMMARY_NAME_WIDTH),
            p.count,
            p.percentage
        )?;
    }
    writeln!(w)
}

fn write_dominance<W: Write>(w: &mut W, patterns: &[FailurePattern]) -> io::Result<()> {
    let Some(top) = patterns.first() else {
        return Ok(());
    };
    if top.percentage > 50.0 {
        writeln!(w, "  🎯 Single dominant failure pattern ({})", top.category)
    } else if patterns.get(1).is_some_and(|p| p.percentage > 25.0) {
        writeln!(w, "  📊 Multiple significant failure patterns")
    } else {
        writeln!(w, "  🔀 Diverse failure patterns - no clear dominant issue")
    }
}

pub(crate) fn write_merge_summary<W: Write>(w: &mut W, summary: &MergeSummary) -> io::Result<()> {
    write!(w, "Merge Summary\n=============\n\n")?;

    writeln!(w, "Test Failure Statistics:")?;
    writeln!(w, "  Total Failures:    {}", summary.total_failures)?;
    writeln!(w, "  Unique Tests:       {}", summary.unique_tests)?;
    if summary.unique_tests > 0 {
        let avg = summary.total_failures as f64 / summary.unique_tests as f64;
        writeln!(w, "  Avg per Test:       {avg:.1}")?;
    }
    if summary.quarantined_failures > 0 {
        writeln!(w, "  Quarantined:        {}", summary.quarantined_failures)?;
    }
    writeln!(w)?;

    if !summary.categories.is_empty() {
        writeln!(w, "Failure Categories:")?;
        for stat in &summary.categories {
            writeln!(
                w,
                "  {:<10}: {} ({:.1}%)",
                stat.category.as_str(),
                stat.count,
                stat.percentage
            )?;
        }
        writeln!(w)?;
    }

    if !summary.top_patterns.is_empty() {
        write_top_patterns(w, &summary.top_patterns, MERGE_TOP_TESTS)?;
    }

    if !summary.jobs.is_empty() {
        writeln!(w, "Most Affected Jobs:")?;
        let mut jobs: Vec<_> = summary.jobs.iter().collect();
        jobs.sort_by(|a, b| b.1.failure_count.cmp(&a.1.failure_count));
        for (i, (job, breakdown)) in jobs.into_iter().take(MERGE_TOP_JOBS).enumerate() {
            writeln!(
                w,
                "  {}. {} ({} failures, {:.1}%)",
                i + 1,
                truncate(job, SUMMARY_JOB_WIDTH),
                breakdown.failure_count,
                percentage(breakdown.failure_count, summary.total_failures)
            )?;
        }
        writeln!(w)?;
    }

    writeln!(w, "Pattern Analysis:")?;
    if summary.total_failures == 0 {
        return writeln!(w, "  🎉 No test failures detected!");
    }
    write_dominance(w, &summary.top_patterns)?;
    if let Some(focus) = summary.categories.first() {
        if focus.percentage > 60.0 {
            writeln!(
                w,
                "  🔍 Focus area: {} category ({:.1}% of failures)",
                focus.category, focus.percentage
            )?;
        }
    }
    Ok(())
}

/// `2025-08-20 16:22:12 UTC`; unparsable input is shown as-is.
fn display_time(raw: &str) -> String {
    parse_timestamp(raw).map_or_else(
        || raw.to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

fn display_span(first: &str, last: &str) -> Option<String> {
    let span = parse_timestamp(last)? - parse_timestamp(first)?;
    if span.num_seconds() == 0 {
        Some("Single run".to_string())
    } else {
        Some(human_duration(span))
    }
}

pub(crate) fn write_lane_summary<W: Write>(w: &mut W, job: &str, lane: &LaneSummary) -> io::Result<()> {
    writeln!(w, "Lane Summary: {job}")?;
    write!(w, "{}\n\n", "=".repeat(job.len() + 14))?;

    if let (Some(first), Some(last)) = (&lane.first_run_time, &lane.last_run_time) {
        writeln!(w, "Time Range:")?;
        writeln!(w, "  First Run:  {}", display_time(first))?;
        writeln!(w, "  Last Run:   {}", display_time(last))?;
        if let Some(span) = display_span(first, last) {
            writeln!(w, "  Duration:   {span}")?;
        }
        writeln!(w)?;
    }

    // runs whose enrichment failed are counted in total_runs only
    let untallied = lane.total_runs.saturating_sub(
        lane.successful_runs + lane.failed_runs + lane.aborted_runs + lane.error_runs + lane.unknown_runs,
    );
    writeln!(w, "Test Run Statistics:")?;
    writeln!(w, "  Total Runs:     {}", lane.total_runs)?;
    writeln!(w, "  Successful:     {}", lane.successful_runs)?;
    writeln!(w, "  Failed:         {}", lane.failed_runs)?;
    if lane.aborted_runs > 0 {
        writeln!(w, "  Aborted:        {}", lane.aborted_runs)?;
    }
    if lane.error_runs > 0 {
        writeln!(w, "  Error:          {}", lane.error_runs)?;
    }
    writeln!(w, "  Unknown:        {}", lane.unknown_runs + untallied)?;
    write!(w, "  Failure Rate:   {:.1}%\n\n", lane.failure_rate)?;

    if lane.all_failures.is_empty() {
        return writeln!(w, "🎉 No test failures detected!");
    }

    writeln!(w, "Test Failure Statistics:")?;
    writeln!(w, "  Total Failures: {}", lane.all_failures.len())?;
    write!(w, "  Unique Tests:   {}\n\n", lane.test_failures.len())?;

    if !lane.top_failures.is_empty() {
        writeln!(w, "Failure Categories:")?;
        for stat in category_breakdown(&lane.top_failures, lane.all_failures.len()) {
            writeln!(
                w,
                "  {:<10}: {} ({:.1}%)",
                stat.category.as_str(),
                stat.count,
                stat.percentage
            )?;
        }
        writeln!(w)?;
        write_top_patterns(w, &lane.top_failures, LANE_TOP_TESTS)?;
    }

    writeln!(w, "Pattern Analysis:")?;
    let rate = lane.failure_rate;
    if rate > 80.0 {
        writeln!(w, "  🔴 High failure rate - investigate systemic issues")?;
    } else if rate > 50.0 {
        writeln!(w, "  🟡 Moderate failure rate - monitor trends")?;
    } else if rate > 20.0 {
        writeln!(w, "  🟠 Low failure rate - normal fluctuation")?;
    } else {
        writeln!(w, "  🟢 Very low failure rate - stable")?;
    }
    write_dominance(w, &lane.top_failures)
}

/// Which lane view to render; flags resolve with the same priority as `merge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LaneView {
    pub mode: DisplayMode,
    pub summary: bool,
    pub show_failures: bool,
}

fn failed_run_urls(lane: &LaneSummary) -> Vec<&str> {
    lane.runs
        .iter()
        .filter(|run| run.status == RunStatus::Failure)
        .map(|run| run.url.as_str())
        .collect()
}

pub(crate) fn write_lane<W: Write>(
    w: &mut W,
    job: &str,
    lane: &LaneSummary,
    view: LaneView,
) -> io::Result<()> {
    if view.summary {
        return write_lane_summary(w, job, lane);
    }
    match view.mode {
        DisplayMode::UrlsOnly => {
            for url in failed_run_urls(lane) {
                writeln!(w, "{url}")?;
            }
            Ok(())
        }
        DisplayMode::NamesOnly => {
            for tc in &lane.all_failures {
                writeln!(w, "{}", tc.name)?;
            }
            Ok(())
        }
        DisplayMode::Counted => {
            let mut grouped: BTreeMap<String, Vec<TestCase>> = BTreeMap::new();
            for tc in &lane.all_failures {
                grouped.entry(tc.name.clone()).or_default().push(tc.clone());
            }
            write_counted(w, &grouped, view.show_failures)
        }
        _ => {
            for tc in &lane.all_failures {
                write_failure_entry(w, view.show_failures, tc)?;
            }
            Ok(())
        }
    }
}

pub(crate) fn merge_json(result: &ProcessorResult, mode: DisplayMode, summary: Option<&MergeSummary>) -> Value {
    match mode {
        DisplayMode::UrlsOnly => {
            let urls: Vec<&str> = result
                .all_test_cases()
                .map(|tc| tc.url.as_str())
                .filter(|url| !url.is_empty())
                .collect();
            json!({ "urls": urls })
        }
        DisplayMode::NamesOnly => {
            let names: Vec<&String> = result.failed_tests.keys().collect();
            json!({ "test_names": names })
        }
        DisplayMode::GroupedByLaneRun => json!({ "lane_run_failures": result.lane_run_failures }),
        DisplayMode::Counted => {
            let counts: BTreeMap<&String, usize> = result
                .failed_tests
                .iter()
                .map(|(name, cases)| (name, cases.len()))
                .collect();
            json!({
                "test_failure_counts": counts,
                "failed_tests": result.failed_tests,
            })
        }
        DisplayMode::Summary => json!({
            "summary": summary,
            "failed_tests": result.failed_tests,
        }),
        DisplayMode::Default => json!({
            "failed_tests": result.failed_tests,
            "lane_run_failures": result.lane_run_failures,
        }),
    }
}

pub(crate) fn lane_json(job: &str, lane: &LaneSummary, view: LaneView) -> Value {
    match view.mode {
        DisplayMode::UrlsOnly => json!({ "job_name": job, "urls": failed_run_urls(lane) }),
        DisplayMode::NamesOnly => {
            let names: Vec<&String> = lane.test_failures.keys().collect();
            json!({ "job_name": job, "test_names": names })
        }
        DisplayMode::Counted => json!({ "job_name": job, "test_failures": lane.test_failures }),
        _ if view.summary => json!({
            "job_name": job,
            "total_runs": lane.total_runs,
            "successful_runs": lane.successful_runs,
            "failed_runs": lane.failed_runs,
            "failure_rate": lane.failure_rate,
            "test_failures": lane.test_failures,
            "all_failures": lane.all_failures,
            "top_failures": lane.top_failures,
            "first_run_time": lane.first_run_time,
            "last_run_time": lane.last_run_time,
            "runs": lane.runs,
        }),
        _ => json!({ "job_name": job, "all_failures": lane.all_failures }),
    }
}

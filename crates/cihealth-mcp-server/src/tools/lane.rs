use super::views::{patterns, PatternView, RunStatistics, TimeRange};
use super::{bool_arg, required_str, str_arg, ToolContext, ToolError};
use anyhow::Result;
use cihealth_core::summary::CategoryStat;
use cihealth_core::{
    analyze_trends, assess_lane, category_breakdown, compare_periods, parse_time_period,
    HealthStatus, LaneSummary, PeriodComparison, Stability, TrendAnalysis,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
struct LaneTrends {
    is_improving: bool,
    regression_detected: bool,
    stability: Stability,
    recommendation: String,
}

#[derive(Debug, Serialize)]
struct JobAnalysis {
    job_name: String,
    time_range: TimeRange,
    statistics: RunStatistics,
    health_status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_failures: Option<Vec<PatternView>>,
    trends: LaneTrends,
    #[serde(rename = "failure_categories", skip_serializing_if = "Option::is_none")]
    categories: Option<Vec<CategoryStat>>,
    summary: String,
}

pub async fn analyze_job_lane(ctx: &ToolContext, args: &Value) -> Result<Value> {
    let job = required_str(args, "job_name")?;
    let since = str_arg(args, "since", "24h");
    let include_details = bool_arg(args, "include_details", true);

    let period = match parse_time_period(since) {
        Ok(p) => p,
        Err(e) => return ToolError::from_health(&e).result(),
    };
    let lane = match ctx.lane(job, period, ctx.cfg.max_history).await {
        Ok(lane) => lane,
        Err(e) => return ToolError::from_health(&e).result(),
    };

    let assessment = assess_lane(job, &lane);
    let analysis = JobAnalysis {
        job_name: job.to_string(),
        time_range: TimeRange::new(&lane, &assessment),
        statistics: RunStatistics::from(&lane),
        health_status: assessment.health,
        top_failures: include_details.then(|| patterns(&lane.top_failures)),
        trends: LaneTrends {
            is_improving: assessment.is_improving,
            regression_detected: assessment.regression_detected,
            stability: assessment.stability,
            recommendation: assessment.recommendation.clone(),
        },
        categories: include_details
            .then(|| category_breakdown(&lane.top_failures, lane.all_failures.len())),
        summary: assessment.summary,
    };
    Ok(serde_json::to_value(analysis)?)
}

#[derive(Debug, Serialize)]
struct PeriodView {
    period: String,
    time_range: TimeRange,
    statistics: RunStatistics,
    top_failures: Vec<PatternView>,
}

impl PeriodView {
    fn new(job: &str, period: &str, lane: &LaneSummary) -> Self {
        let assessment = assess_lane(job, lane);
        Self {
            period: period.to_string(),
            time_range: TimeRange::new(lane, &assessment),
            statistics: RunStatistics::from(lane),
            top_failures: patterns(&lane.top_failures),
        }
    }
}

#[derive(Debug, Serialize)]
struct TimeComparison {
    job_name: String,
    recent_period: PeriodView,
    comparison_period: PeriodView,
    changes: PeriodComparison,
}

pub async fn compare_time_periods(ctx: &ToolContext, args: &Value) -> Result<Value> {
    let job = required_str(args, "job_name")?;
    let recent_label = str_arg(args, "recent_period", "24h");
    let comparison_label = str_arg(args, "comparison_period", "7d");

    let (recent_period, comparison_period) =
        match (parse_time_period(recent_label), parse_time_period(comparison_label)) {
            (Ok(r), Ok(c)) => (r, c),
            (Err(e), _) | (_, Err(e)) => return ToolError::from_health(&e).result(),
        };

    let recent = match ctx.lane(job, recent_period, ctx.cfg.max_history).await {
        Ok(lane) => lane,
        Err(e) => return ToolError::from_health(&e).result(),
    };
    let comparison = match ctx.lane(job, comparison_period, ctx.cfg.max_history).await {
        Ok(lane) => lane,
        Err(e) => return ToolError::from_health(&e).result(),
    };

    let response = TimeComparison {
        job_name: job.to_string(),
        recent_period: PeriodView::new(job, recent_label, &recent),
        comparison_period: PeriodView::new(job, comparison_label, &comparison),
        changes: compare_periods(job, &recent, &comparison),
    };
    Ok(serde_json::to_value(response)?)
}

#[derive(Debug, Serialize)]
struct TrendReport {
    job_name: String,
    trend_period: String,
    #[serde(flatten)]
    analysis: TrendAnalysis,
}

pub async fn analyze_failure_trends(ctx: &ToolContext, args: &Value) -> Result<Value> {
    let job = required_str(args, "job_name")?;
    let trend_period = str_arg(args, "trend_period", "14d");
    let include_flakiness = bool_arg(args, "include_flakiness", true);

    let period = match parse_time_period(trend_period) {
        Ok(p) => p,
        Err(e) => return ToolError::from_health(&e).result(),
    };
    let lane = match ctx.lane(job, period, ctx.cfg.max_trend_history).await {
        Ok(lane) => lane,
        Err(e) => return ToolError::from_health(&e).result(),
    };

    let report = TrendReport {
        job_name: job.to_string(),
        trend_period: trend_period.to_string(),
        analysis: analyze_trends(&lane.runs, include_flakiness),
    };
    Ok(serde_json::to_value(report)?)
}

use std::io::Write;

use anyhow::Context;
use cihealth_core::{
    analyze_lane_runs, parse_time_period, CiHealthClient, DisplayFlags, DisplayMode,
};
use tracing::info;

use super::output::{self, LaneView};
use super::super::args::{LaneArgs, OutputFormat};
use crate::exit_codes::SUCCESS;

/// Upper bound on runs fetched for a `--since` window.
const MAX_PERIOD_RUNS: usize = 1000;

pub(crate) async fn run(args: LaneArgs) -> anyhow::Result<i32> {
    let period = parse_time_period(&args.since).context("invalid --since")?;
    let client = CiHealthClient::from_env()?;

    let runs = if period.is_zero() {
        client.fetch_job_history(&args.job, args.limit).await
    } else {
        client
            .fetch_job_history_with_time_period(&args.job, period, MAX_PERIOD_RUNS)
            .await
    }
    .with_context(|| format!("failed to fetch job history for {}", args.job))?;
    info!(job = %args.job, runs = runs.len(), "analyzing lane");

    let mut lane = analyze_lane_runs(&client, runs).await;
    if let Some(job_type) = args.job_type {
        lane = lane.filter_by_job_type(job_type);
    }

    let view = LaneView {
        mode: DisplayMode::resolve(DisplayFlags {
            urls_only: args.url,
            names_only: args.name,
            counted: args.count,
            ..DisplayFlags::default()
        }),
        summary: args.summary,
        show_failures: args.failures,
    };

    if args.output == OutputFormat::Json {
        let value = output::lane_json(&args.job, &lane, view);
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        let mut stdout = std::io::stdout().lock();
        output::write_lane(&mut stdout, &args.job, &lane, view)?;
        stdout.flush()?;
    }
    Ok(SUCCESS)
}

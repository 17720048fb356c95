use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use cihealth_core::{
    generate_merge_summary, parse_time_period, process_failures, CiHealthClient, DisplayFlags,
    DisplayMode, FailureSink, ProcessorConfig, TestCase,
};
use tracing::debug;

use super::output;
use super::super::args::{MergeArgs, OutputFormat};
use crate::exit_codes::SUCCESS;

pub(crate) async fn run(args: MergeArgs) -> anyhow::Result<i32> {
    let period = parse_time_period(&args.since).context("invalid --since")?;
    let mode = DisplayMode::resolve(DisplayFlags {
        urls_only: args.url,
        names_only: args.name,
        lane_run: args.lane_run,
        counted: args.count,
        summary: args.summary,
    });
    let json = args.output == OutputFormat::Json;

    let show_failures = args.failures;
    let sink: FailureSink = Arc::new(move |tc: &TestCase| {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = output::write_streamed(&mut stdout, mode, show_failures, tc) {
            debug!(error = %e, "stdout closed");
        }
    });
    let config = ProcessorConfig::new(&args.job, &args.test)?
        .with_mode(mode)
        .with_failure_bodies(args.failures)
        .with_quarantine_check(args.quarantine)
        .with_time_period(period)
        .with_suppressed_output(json)
        .with_sink(sink);

    let client = CiHealthClient::from_env()?;
    let results = client
        .fetch_results()
        .await
        .context("failed to fetch ci-health results")?;
    let result = process_failures(&client, &results, &config).await?;

    let summary = (mode == DisplayMode::Summary)
        .then(|| generate_merge_summary(&result, &client.config().layout));

    if json {
        let value = output::merge_json(&result, mode, summary.as_ref());
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(SUCCESS);
    }

    let mut stdout = std::io::stdout().lock();
    match mode {
        DisplayMode::Summary => {
            if let Some(summary) = &summary {
                output::write_merge_summary(&mut stdout, summary)?;
            }
        }
        DisplayMode::GroupedByLaneRun => {
            output::write_lane_runs(&mut stdout, &result.lane_run_failures, args.failures)?;
        }
        DisplayMode::Counted => {
            output::write_counted(&mut stdout, &result.failed_tests, args.failures)?;
        }
        // already streamed
        DisplayMode::Default | DisplayMode::UrlsOnly | DisplayMode::NamesOnly => {}
    }
    stdout.flush()?;
    Ok(SUCCESS)
}

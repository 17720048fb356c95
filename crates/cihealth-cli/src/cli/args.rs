use clap::{Parser, Subcommand, ValueEnum};

use cihealth_core::JobType;

#[derive(Parser)]
#[command(
    name = "cihealth",
    version,
    about = "Aggregate and analyze KubeVirt CI test failures"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Report failed tests from the ci-health failed-job leaderboard
    Merge(MergeArgs),
    /// Analyze recent runs of a single lane
    Lane(LaneArgs),
    /// List currently quarantined tests
    Quarantine(QuarantineArgs),
    /// Serve the analysis tools over MCP on stdio
    Mcp(McpArgs),
    /// Print the version
    Version,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Clone, Debug)]
pub struct MergeArgs {
    /// Job name regex or alias (main, compute, compute-1.6, network, storage, 1.4, 1.5, 1.6)
    pub job: String,

    /// Test name regex
    #[arg(short = 't', long = "test", default_value = "")]
    pub test: String,

    /// Count failures per test
    #[arg(short = 'c', long)]
    pub count: bool,

    /// Display only failed run URLs
    #[arg(short = 'u', long)]
    pub url: bool,

    /// Display only failed test names
    #[arg(short = 'n', long)]
    pub name: bool,

    /// Print captured failure context
    #[arg(short = 'f', long)]
    pub failures: bool,

    /// Group failures by lane run
    #[arg(short = 'l', long = "lane-run")]
    pub lane_run: bool,

    /// Check and highlight quarantined tests
    #[arg(short = 'q', long)]
    pub quarantine: bool,

    /// Limit results to a time period (e.g. 24h, 2d, 1w)
    #[arg(short = 's', long, default_value = "")]
    pub since: String,

    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Concise summary of failures and patterns
    #[arg(long)]
    pub summary: bool,
}

#[derive(Parser, Clone, Debug)]
pub struct LaneArgs {
    /// Exact job (lane) name
    pub job: String,

    /// Number of recent runs to analyze (ignored with --since)
    #[arg(short = 'l', long, default_value_t = 10)]
    pub limit: usize,

    /// Count failures per test
    #[arg(short = 'c', long)]
    pub count: bool,

    /// Display only failed run URLs
    #[arg(short = 'u', long)]
    pub url: bool,

    /// Display only failed test names
    #[arg(short = 'n', long)]
    pub name: bool,

    /// Print captured failure context
    #[arg(short = 'f', long)]
    pub failures: bool,

    /// Fetch every run within a time period (e.g. 24h, 2d, 1w)
    #[arg(short = 's', long, default_value = "")]
    pub since: String,

    /// Concise summary of runs and failure patterns
    #[arg(long)]
    pub summary: bool,

    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Only keep runs of one job type (presubmit, postsubmit, periodic, batch)
    #[arg(short = 't', long = "type")]
    pub job_type: Option<JobType>,
}

#[derive(Parser, Clone, Debug)]
pub struct QuarantineArgs {
    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

#[derive(Parser, Clone, Debug)]
pub struct McpArgs {
    /// Print the endpoints and tool list to stderr before serving
    #[arg(short = 'd', long)]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_merge_flags() {
        let cli = Cli::try_parse_from([
            "cihealth", "merge", "compute", "-t", "Migration", "-c", "-q", "-s", "2d", "-o", "json",
        ])
        .unwrap();
        let Command::Merge(args) = cli.cmd else {
            panic!("expected merge");
        };
        assert_eq!(args.job, "compute");
        assert_eq!(args.test, "Migration");
        assert!(args.count && args.quarantine);
        assert_eq!(args.since, "2d");
        assert_eq!(args.output, OutputFormat::Json);
    }

    #[test]
    fn test_lane_defaults_and_type() {
        let cli = Cli::try_parse_from(["cihealth", "lane", "pull-x"]).unwrap();
        let Command::Lane(args) = cli.cmd else {
            panic!("expected lane");
        };
        assert_eq!(args.limit, 10);
        assert_eq!(args.output, OutputFormat::Text);
        assert!(args.job_type.is_none());

        let cli = Cli::try_parse_from(["cihealth", "lane", "pull-x", "--type", "Batch"]).unwrap();
        let Command::Lane(args) = cli.cmd else {
            panic!("expected lane");
        };
        assert_eq!(args.job_type, Some(JobType::Batch));

        assert!(Cli::try_parse_from(["cihealth", "lane", "pull-x", "-t", "nightly"]).is_err());
    }

    #[test]
    fn test_job_argument_required() {
        assert!(Cli::try_parse_from(["cihealth", "merge"]).is_err());
        assert!(Cli::try_parse_from(["cihealth", "merge", "a", "b"]).is_err());
    }
}

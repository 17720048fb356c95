use cihealth_core::CiHealthClient;
use cihealth_mcp_server::{serve_stdio, ServerConfig, ToolContext};
use tracing::debug;

use super::super::args::McpArgs;
use crate::exit_codes::SUCCESS;

pub(crate) async fn run(args: McpArgs) -> anyhow::Result<i32> {
    let client = CiHealthClient::from_env()?;
    let cfg = ServerConfig::from_env();

    if args.debug {
        eprintln!("[cihealth] results feed: {}", client.config().results_url);
        eprintln!(
            "[cihealth] cache ttl: {}s, max history: {}",
            cfg.results_ttl.as_secs(),
            cfg.max_history
        );
        for tool in cihealth_mcp_server::tools::definitions() {
            eprintln!("[cihealth] tool: {}", tool["name"].as_str().unwrap_or_default());
        }
    }
    debug!("starting MCP server");

    serve_stdio(ToolContext::new(client, cfg)).await?;
    Ok(SUCCESS)
}

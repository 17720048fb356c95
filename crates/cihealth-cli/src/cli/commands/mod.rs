use super::args::{Cli, Command};
use crate::exit_codes::SUCCESS;

pub mod lane;
pub mod mcp;
pub mod merge;
pub mod output;
pub mod quarantine;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Merge(args) => merge::run(args).await,
        Command::Lane(args) => lane::run(args).await,
        Command::Quarantine(args) => quarantine::run(args).await,
        Command::Mcp(args) => mcp::run(args).await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(SUCCESS)
        }
    }
}

use anyhow::Context;
use cihealth_core::CiHealthClient;
use serde_json::json;

use super::super::args::{OutputFormat, QuarantineArgs};
use crate::exit_codes::SUCCESS;

pub(crate) async fn run(args: QuarantineArgs) -> anyhow::Result<i32> {
    let client = CiHealthClient::from_env()?;
    let quarantined = client
        .fetch_quarantined_tests()
        .await
        .context("failed to fetch quarantined tests")?;

    match args.output {
        OutputFormat::Json => {
            let names: Vec<&str> = quarantined.iter().collect();
            let value = json!({ "count": names.len(), "quarantined_tests": names });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            for name in quarantined.iter() {
                println!("{name}");
            }
            eprintln!("{} quarantined tests", quarantined.len());
        }
    }
    Ok(SUCCESS)
}

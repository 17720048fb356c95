use super::{bool_arg, required_str, ToolContext, ToolError};
use anyhow::Result;
use serde_json::{json, Value};

pub async fn get_failure_source_context(ctx: &ToolContext, args: &Value) -> Result<Value> {
    let failure_text = required_str(args, "failure_text")?;
    let job_url = required_str(args, "job_url")?;
    let include_stack_trace = bool_arg(args, "include_stack_trace", true);

    match ctx
        .client
        .failure_source_context(failure_text, job_url, include_stack_trace)
        .await
    {
        Ok(context) => Ok(serde_json::to_value(context)?),
        Err(e) => ToolError::from_health(&e).result(),
    }
}

pub async fn get_build_log_context(ctx: &ToolContext, args: &Value) -> Result<Value> {
    let job_url = required_str(args, "job_url")?;
    let build_log_url = ctx.client.config().build_log_url(job_url);

    match ctx.client.fetch_build_log_context(job_url).await {
        Ok(context) => Ok(json!({
            "job_url": job_url,
            "build_log_url": build_log_url,
            "line_count": context.lines().count(),
            "context": context,
        })),
        Err(e) => ToolError::from_health(&e).result(),
    }
}

//! Newline-delimited JSON-RPC 2.0 loop.

use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::jsonrpc::{
    error_codes, ErrorPayload, JsonRpcRequest, JsonRpcResponse, ResultPayload, ToolResultBody,
};
use crate::tools::{self, ToolContext};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub struct McpServer {
    ctx: ToolContext,
}

impl McpServer {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    /// Answer one request line. `None` for blank lines and notifications.
    pub async fn handle_line(&self, line: &str) -> Result<Option<String>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let req: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "unparsable request");
                return encode(
                    Value::Null,
                    ErrorPayload::new(error_codes::PARSE_ERROR, format!("parse error: {e}")),
                );
            }
        };

        let Some(id) = req.id.clone() else {
            debug!(method = %req.method, "notification ignored");
            return Ok(None);
        };
        if req.jsonrpc != "2.0" {
            return encode(
                id,
                ErrorPayload::new(error_codes::INVALID_REQUEST, "jsonrpc must be \"2.0\""),
            );
        }

        debug!(method = %req.method, "request");
        match req.method.as_str() {
            "initialize" => {
                let version = req
                    .params
                    .get("protocolVersion")
                    .and_then(|v| v.as_str())
                    .unwrap_or(PROTOCOL_VERSION);
                ok(
                    id,
                    json!({
                        "protocolVersion": version,
                        "capabilities": { "tools": {} },
                        "serverInfo": {
                            "name": "cihealth",
                            "version": env!("CARGO_PKG_VERSION"),
                        },
                    }),
                )
            }
            "ping" => ok(id, json!({})),
            "tools/list" => ok(id, json!({ "tools": tools::definitions() })),
            "tools/call" => {
                let Some(params) = req.tool_params() else {
                    return encode(
                        id,
                        ErrorPayload::new(error_codes::INVALID_PARAMS, "invalid tools/call params"),
                    );
                };
                info!(tool = %params.name, "tool call");
                let body = match tools::call(&self.ctx, &params.name, &params.arguments).await {
                    None => {
                        return encode(
                            id,
                            ErrorPayload::new(
                                error_codes::INVALID_PARAMS,
                                format!("unknown tool: {}", params.name),
                            ),
                        )
                    }
                    Some(Ok(value)) => {
                        let is_error = value.get("error").is_some();
                        let mut body =
                            ToolResultBody::text(serde_json::to_string_pretty(&value)?, is_error);
                        body.structured_content = Some(value);
                        body
                    }
                    Some(Err(e)) => {
                        warn!(tool = %params.name, error = %e, "tool failed");
                        ToolResultBody::text(format!("{e:#}"), true)
                    }
                };
                ok(id, serde_json::to_value(body)?)
            }
            other => encode(
                id,
                ErrorPayload::new(
                    error_codes::METHOD_NOT_FOUND,
                    format!("method not found: {other}"),
                ),
            ),
        }
    }

    /// Serve requests from `reader` until EOF, one response line per request.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();
        while reader.read_line(&mut line).await? > 0 {
            match self.handle_line(&line).await {
                Ok(Some(response)) => {
                    writer.write_all(response.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await?;
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "failed to encode response"),
            }
            line.clear();
        }
        Ok(())
    }
}

/// Serve on the process's stdin/stdout.
pub async fn serve_stdio(ctx: ToolContext) -> Result<()> {
    info!("cihealth MCP server listening on stdio");
    McpServer::new(ctx)
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
}

fn ok(id: Value, result: Value) -> Result<Option<String>> {
    encode(id, ResultPayload { result })
}

fn encode<T: Serialize>(id: Value, payload: T) -> Result<Option<String>> {
    Ok(Some(serde_json::to_string(&JsonRpcResponse::new(id, payload))?))
}

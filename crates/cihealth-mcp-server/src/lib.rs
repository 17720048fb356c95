//! Model Context Protocol server for CI health analysis.
//!
//! Speaks newline-delimited JSON-RPC 2.0 on stdio and exposes the
//! `cihealth-core` queries as tools: lane analysis, per-run failures,
//! leaderboard (merge) failures, pattern search, period comparison,
//! trends, source context and build-log context.
//!
//! Tool failures are reported as `isError: true` results; the server
//! keeps running.

pub mod cache;
pub mod config;
pub mod jsonrpc;
pub mod server;
pub mod tools;

pub use config::ServerConfig;
pub use server::{serve_stdio, McpServer, PROTOCOL_VERSION};
pub use tools::ToolContext;

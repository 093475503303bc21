/// PageSpeed MCP Server Entry Point
///
/// Exposes Google PageSpeed Insights as the `run_pagespeed_test` MCP tool.
/// Configuration is read from the environment (see `core::config`), the tool
/// registry is built once, and the selected transport runs until the host
/// disconnects. Any startup failure is logged and exits with status 1.

mod core;
mod tools;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::core::config::{ServerConfig, TransportMode};
use crate::core::error::ServerError;
use crate::core::registry::ToolRegistry;
use crate::core::server::{self, ServerContext};
use crate::tools::pagespeed::PageSpeedClient;

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        error!("Fatal error running server: {}", e);
        std::process::exit(1);
    }
}

/// Log to stderr; stdout is reserved for JSON-RPC in STDIO mode.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run() -> Result<(), ServerError> {
    let config = ServerConfig::from_env()?;

    let registry = ToolRegistry::new(PageSpeedClient::new()?);
    info!("Registered {} tools", registry.list_tools().len());

    let ctx = Arc::new(ServerContext::new(
        config.name.clone(),
        config.version.clone(),
        registry,
    ));

    match config.transport {
        TransportMode::Stdio => server::run_server_stdio(ctx).await?,
        TransportMode::Http => server::run_server_http(ctx, &config).await?,
        TransportMode::Both => {
            // STDIO in the background, HTTP in the foreground
            let stdio_ctx = Arc::clone(&ctx);
            let stdio_handle = tokio::spawn(async move {
                if let Err(e) = server::run_server_stdio(stdio_ctx).await {
                    error!(error = %e, "STDIO server error");
                }
            });

            let http_result = server::run_server_http(ctx, &config).await;

            // If HTTP server exits, abort STDIO task
            stdio_handle.abort();
            http_result?;
        }
    }

    Ok(())
}

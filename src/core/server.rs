/// MCP Server Implementation
///
/// This module contains the transport layer of the server:
/// - Method dispatch shared by every transport (initialize, ping, tools/list, tools/call)
/// - HTTP server setup with Actix Web
/// - STDIO server implementation for line-based communication
///
/// Both transports hold the same `ServerContext`, which is built once at
/// startup and never mutated afterwards.

use actix_web::{
    web, App, HttpServer, HttpResponse, Result,
    middleware::{Compress, Logger, DefaultHeaders},
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::config::ServerConfig;
use crate::core::protocol::{CallToolParams, McpError, McpRequest, McpResponse, PROTOCOL_VERSION};
use crate::core::registry::ToolRegistry;

/// Immutable server state shared by every request handler.
pub struct ServerContext {
    /// Server name as reported in MCP initialize responses
    pub server_name: String,
    /// Server version string as reported in MCP initialize responses
    pub server_version: String,
    pub registry: ToolRegistry,
}

impl ServerContext {
    pub fn new(server_name: String, server_version: String, registry: ToolRegistry) -> Self {
        Self {
            server_name,
            server_version,
            registry,
        }
    }
}

/// Route one JSON-RPC request to its MCP method handler.
///
/// Returns `None` for notifications, which never get a response.
pub async fn handle_request(ctx: &ServerContext, req: McpRequest) -> Option<McpResponse> {
    if req.is_notification() {
        // notifications/initialized and friends need no acknowledgement
        debug!(method = %req.method, "notification received");
        return None;
    }

    let McpRequest { id, method, params, .. } = req;
    debug!(method = %method, "request received");

    let response = match method.as_str() {
        "initialize" => McpResponse::success(id, initialize_result(ctx)),
        "ping" => McpResponse::success(id, json!({})),
        "tools/list" => McpResponse::success(id, json!({ "tools": ctx.registry.list_tools() })),
        "tools/call" => handle_tools_call(ctx, id, params).await,
        _ => McpResponse::error(id, McpError::method_not_found(&method)),
    };
    Some(response)
}

fn initialize_result(ctx: &ServerContext) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": ctx.server_name,
            "version": ctx.server_version
        }
    })
}

/// Handle MCP tools/call method.
///
/// Only a malformed envelope (missing or non-object params) is a JSON-RPC
/// error. Everything that goes wrong inside the tool is reported through the
/// tool result with `isError: true`.
async fn handle_tools_call(
    ctx: &ServerContext,
    id: Option<Value>,
    params: Option<Value>,
) -> McpResponse {
    let call: CallToolParams = match params.map(serde_json::from_value) {
        Some(Ok(call)) => call,
        Some(Err(e)) => {
            warn!(error = %e, "malformed tools/call params");
            return McpResponse::error(id, McpError::invalid_params());
        }
        None => return McpResponse::error(id, McpError::invalid_params()),
    };

    // Absent arguments are validated as an empty object
    let arguments = call.arguments.unwrap_or_else(|| json!({}));
    let result = ctx.registry.call_tool(&call.name, arguments).await;

    match serde_json::to_value(&result) {
        Ok(value) => McpResponse::success(id, value),
        Err(e) => McpResponse::error(id, McpError::internal_error(e)),
    }
}

/// Health check endpoint handler.
///
/// Used by load balancers and monitoring systems to verify server availability.
async fn health(ctx: web::Data<ServerContext>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": ctx.server_name
    })))
}

/// MCP JSON-RPC request handler for HTTP mode.
///
/// Counts the request, dispatches it and returns the JSON-RPC response.
/// Notifications are accepted with an empty 202.
async fn mcp_handler(
    ctx: web::Data<ServerContext>,
    counter: web::Data<AtomicU64>,
    req: web::Json<McpRequest>,
) -> Result<HttpResponse> {
    // Relaxed is enough, the counter is not used for synchronization
    counter.fetch_add(1, Ordering::Relaxed);

    match handle_request(&ctx, req.into_inner()).await {
        Some(response) => Ok(HttpResponse::Ok().json(response)),
        None => Ok(HttpResponse::Accepted().finish()),
    }
}

/// Metrics endpoint handler.
///
/// Returns the total number of MCP requests processed since server start.
async fn metrics_handler(counter: web::Data<AtomicU64>) -> Result<HttpResponse> {
    let count = counter.load(Ordering::Relaxed);
    Ok(HttpResponse::Ok().json(json!({
        "requests_total": count,
        "status": "ok"
    })))
}

/// Server-Sent Events endpoint for tools discovery.
///
/// Emits a single event carrying the same tool list as `tools/list` plus a count.
async fn sse_tools_discovery(ctx: web::Data<ServerContext>) -> Result<HttpResponse> {
    use actix_web::http::header;

    let tools = ctx.registry.list_tools();
    let tools_data = json!({
        "tools": tools,
        "count": tools.len()
    });

    // Format as SSE event: "data: {json}\n\n"
    let sse_data = format!(
        "data: {}\n\n",
        serde_json::to_string(&tools_data).unwrap_or_else(|_| "{}".to_string())
    );

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(header::CacheControl(vec![
            header::CacheDirective::NoCache,
            header::CacheDirective::NoStore,
            header::CacheDirective::MustRevalidate,
        ]))
        // Disable nginx buffering
        .insert_header(("x-accel-buffering", "no"))
        .body(sse_data))
}

/// Register all HTTP routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics_handler))
        .route("/sse", web::get().to(sse_tools_discovery))
        .route("/mcp", web::post().to(mcp_handler))
        .route("/", web::post().to(mcp_handler))
        .route("/", web::get().to(health));
}

/// Run the MCP server in HTTP mode.
///
/// Configures and starts an Actix Web HTTP server. The server handles MCP
/// protocol requests over HTTP/JSON-RPC 2.0 until it is shut down.
///
/// # Configuration
/// The server is configured with:
/// - Worker threads: from `ServerConfig::workers`
/// - Max connections: 10,000 concurrent connections
/// - Connection rate limit: 1,000 connections per second
/// - Keep-alive: 30 seconds
/// - Client request timeout: 30 seconds (reading the request only; tool calls are not bounded)
/// - Disconnect timeout: 2 seconds
/// - Shutdown timeout: 10 seconds
pub async fn run_server_http(ctx: Arc<ServerContext>, config: &ServerConfig) -> std::io::Result<()> {
    use std::time::Duration;

    let bind_addr = config.bind_addr();
    let app_state = web::Data::from(ctx);
    let request_count = web::Data::new(AtomicU64::new(0));

    info!(
        name = %config.name,
        version = %config.version,
        bind = %bind_addr,
        workers = config.workers,
        "MCP server starting (HTTP mode)"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(request_count.clone())
            // Enable compression for JSON responses (gzip/brotli)
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block"))
            )
            // %r = request line, %s = status, %Dms = duration in milliseconds
            .wrap(Logger::new("%r %s %Dms"))
            .configure(configure_routes)
    })
    .workers(config.workers)
    .max_connections(10000)
    .max_connection_rate(1000)
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_secs(30))
    .client_disconnect_timeout(Duration::from_secs(2))
    .shutdown_timeout(10)
    .bind(&bind_addr)?
    .run()
    .await
}

/// Run the MCP server in STDIO mode.
///
/// Reads JSON-RPC requests line-by-line from stdin and writes responses to
/// stdout. All logging goes to stderr so it never interleaves with the
/// protocol stream. Returns once stdin is closed and every in-flight request
/// has been answered.
pub async fn run_server_stdio(ctx: Arc<ServerContext>) -> std::io::Result<()> {
    info!(
        name = %ctx.server_name,
        version = %ctx.server_version,
        "MCP server starting (STDIO mode)"
    );

    let stdin = BufReader::with_capacity(8192, tokio::io::stdin());
    serve_lines(ctx, stdin, tokio::io::stdout()).await?;

    info!("STDIO server stopped");
    Ok(())
}

/// Serve line-delimited JSON-RPC from `reader` to `writer`.
///
/// Each request runs on its own task so a slow PageSpeed call does not hold
/// up other requests. Responses go through a channel to a single writer task,
/// which keeps every response on its own line. Serving stops at EOF, or as
/// soon as the writer can no longer deliver responses.
pub async fn serve_lines<R, W>(ctx: Arc<ServerContext>, mut reader: R, writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer_task = tokio::spawn(async move {
        let mut out = BufWriter::with_capacity(8192, writer);
        while let Some(line) = rx.recv().await {
            let written = async {
                out.write_all(line.as_bytes()).await?;
                out.write_all(b"\n").await?;
                // Flush per response, the host is waiting on it
                out.flush().await
            };
            if let Err(e) = written.await {
                warn!(error = %e, "error writing response, closing output");
                break;
            }
        }
    });

    let mut buf = Vec::with_capacity(8192);
    loop {
        buf.clear();
        let read = tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => read?,
            _ = tx.closed() => {
                debug!("output closed, no longer reading requests");
                break;
            }
        };
        if read == 0 {
            break;
        }

        // A bad line only costs that line
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "skipping request line that is not valid UTF-8");
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        let ctx = Arc::clone(&ctx);
        let tx = tx.clone();
        tokio::spawn(async move {
            let Some(response) = handle_line(&ctx, &line).await else {
                return;
            };
            match serde_json::to_string(&response) {
                Ok(json) => {
                    if tx.send(json).is_err() {
                        debug!("output closed, dropping response");
                    }
                }
                Err(e) => error!(error = %e, "failed to serialize response"),
            }
        });
    }

    // The writer stops once every in-flight task has dropped its sender
    drop(tx);
    writer_task.await.map_err(std::io::Error::other)
}

async fn handle_line(ctx: &ServerContext, line: &str) -> Option<McpResponse> {
    match serde_json::from_str::<McpRequest>(line) {
        Ok(req) => handle_request(ctx, req).await,
        Err(e) => {
            warn!(error = %e, "failed to parse request");
            // Only answer if the id can still be recovered
            let id = serde_json::from_str::<Value>(line).ok()?.get("id").cloned()?;
            Some(McpResponse::error(Some(id), McpError::parse_error(e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::{INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR};
    use crate::tools::pagespeed::PageSpeedClient;
    use actix_web::test;
    use std::collections::HashMap;
    use tokio::io::AsyncReadExt;

    fn context() -> Arc<ServerContext> {
        let registry = ToolRegistry::new(PageSpeedClient::new().unwrap());
        Arc::new(ServerContext::new(
            "pagespeed-server".to_string(),
            "0.1.0".to_string(),
            registry,
        ))
    }

    fn request(value: Value) -> McpRequest {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let ctx = context();
        let response = handle_request(&ctx, request(json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": {"protocolVersion": "2024-11-05", "capabilities": {}}
        })))
        .await
        .unwrap();

        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], json!("2024-11-05"));
        assert_eq!(result["serverInfo"]["name"], json!("pagespeed-server"));
        assert_eq!(result["capabilities"]["tools"], json!({}));
    }

    #[tokio::test]
    async fn tools_list_uses_mcp_field_names() {
        let ctx = context();
        let response = handle_request(&ctx, request(json!({
            "jsonrpc": "2.0", "id": 2, "method": "tools/list"
        })))
        .await
        .unwrap();

        let tools = &response.result.unwrap()["tools"];
        assert_eq!(tools[0]["name"], json!("run_pagespeed_test"));
        assert!(tools[0].get("inputSchema").is_some());
        assert!(tools[0].get("input_schema").is_none());
    }

    #[tokio::test]
    async fn unknown_tool_is_a_tool_result_not_a_protocol_error() {
        let ctx = context();
        let response = handle_request(&ctx, request(json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": {"name": "lighthouse", "arguments": {}}
        })))
        .await
        .unwrap();

        assert!(response.error.is_none());
        assert_eq!(
            response.result.unwrap(),
            json!({
                "content": [{"type": "text", "text": "Error: Unknown tool: lighthouse"}],
                "isError": true
            })
        );
    }

    #[tokio::test]
    async fn tools_call_without_arguments_fails_validation() {
        let ctx = context();
        let response = handle_request(&ctx, request(json!({
            "jsonrpc": "2.0", "id": 4, "method": "tools/call",
            "params": {"name": "run_pagespeed_test"}
        })))
        .await
        .unwrap();

        let result = response.result.unwrap();
        assert_eq!(result["isError"], json!(true));
        assert!(result["content"][0]["text"].as_str().unwrap().contains("Invalid arguments"));
    }

    #[tokio::test]
    async fn envelope_errors() {
        let ctx = context();

        let missing_params = handle_request(&ctx, request(json!({
            "jsonrpc": "2.0", "id": 5, "method": "tools/call"
        })))
        .await
        .unwrap();
        assert_eq!(missing_params.error.unwrap().code, INVALID_PARAMS);

        let unknown_method = handle_request(&ctx, request(json!({
            "jsonrpc": "2.0", "id": 6, "method": "resources/list"
        })))
        .await
        .unwrap();
        assert_eq!(unknown_method.error.unwrap().code, METHOD_NOT_FOUND);

        let notification = handle_request(&ctx, request(json!({
            "jsonrpc": "2.0", "method": "notifications/initialized"
        })))
        .await;
        assert!(notification.is_none());
    }

    #[tokio::test]
    async fn stdio_stream_answers_each_request_once() {
        let input = [
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"nope","arguments":{}}}"#,
            r#"{"id":4,"method":7}"#,
            "this is not json",
            r#"{"jsonrpc":"2.0","id":5,"method":"ping"}"#,
        ]
        .join("\n");

        let (out_writer, mut out_reader) = tokio::io::duplex(64 * 1024);
        serve_lines(context(), input.as_bytes(), out_writer).await.unwrap();

        let mut output = String::new();
        out_reader.read_to_string(&mut output).await.unwrap();

        let responses: HashMap<i64, Value> = output
            .lines()
            .map(|line| {
                let value: Value = serde_json::from_str(line).unwrap();
                (value["id"].as_i64().unwrap(), value)
            })
            .collect();

        assert_eq!(output.lines().count(), 5);
        assert_eq!(responses[&1]["result"]["serverInfo"]["name"], json!("pagespeed-server"));
        assert_eq!(responses[&2]["result"]["tools"][0]["name"], json!("run_pagespeed_test"));
        assert_eq!(responses[&3]["result"]["isError"], json!(true));
        assert_eq!(responses[&4]["error"]["code"], json!(PARSE_ERROR));
        assert_eq!(responses[&5]["result"], json!({}));
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_skipped() {
        let mut input = Vec::new();
        input.extend_from_slice(br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
        input.extend_from_slice(b"\n\xff\xfe garbage\n");
        input.extend_from_slice(br#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#);
        input.push(b'\n');

        let (out_writer, mut out_reader) = tokio::io::duplex(64 * 1024);
        serve_lines(context(), input.as_slice(), out_writer).await.unwrap();

        let mut output = String::new();
        out_reader.read_to_string(&mut output).await.unwrap();

        let mut ids: Vec<i64> = output
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).unwrap()["id"].as_i64().unwrap())
            .collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn closed_output_stops_reading() {
        // Input stays open, only the output side goes away
        let (mut in_writer, in_reader) = tokio::io::duplex(1024);
        let (out_writer, out_reader) = tokio::io::duplex(1024);
        drop(out_reader);

        in_writer
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n")
            .await
            .unwrap();
        serve_lines(context(), BufReader::new(in_reader), out_writer).await.unwrap();
        drop(in_writer);
    }

    #[actix_rt::test]
    async fn http_routes() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(context()))
                .app_data(web::Data::new(AtomicU64::new(0)))
                .configure(configure_routes),
        )
        .await;

        let health: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/health").to_request())
                .await;
        assert_eq!(health, json!({"status": "ok", "service": "pagespeed-server"}));

        let list: Value = test::call_and_read_body_json(
            &app,
            test::TestRequest::post()
                .uri("/mcp")
                .set_json(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
                .to_request(),
        )
        .await;
        assert_eq!(list["result"]["tools"][0]["name"], json!("run_pagespeed_test"));

        let notification = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/")
                .set_json(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
                .to_request(),
        )
        .await;
        assert_eq!(notification.status(), actix_web::http::StatusCode::ACCEPTED);

        let metrics: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/metrics").to_request())
                .await;
        assert_eq!(metrics["requests_total"], json!(2));

        let sse = test::call_service(&app, test::TestRequest::get().uri("/sse").to_request()).await;
        assert_eq!(
            sse.headers().get("content-type").unwrap(),
            "text/event-stream"
        );
        let body = test::read_body(sse).await;
        assert!(body.starts_with(b"data: {"));
    }
}

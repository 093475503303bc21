/// Core Server Framework Module
///
/// - config.rs: environment-driven process configuration
/// - error.rs: per-call and startup error types
/// - protocol.rs: JSON-RPC 2.0 / MCP message types
/// - registry.rs: closed tool set and call dispatch
/// - server.rs: HTTP and STDIO transports

pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;

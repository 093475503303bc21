/// Tools Module
///
/// One module per MCP tool. Each tool module exports its name, its
/// `descriptor()` for `tools/list`, and the handler the registry dispatches to.

pub mod pagespeed;

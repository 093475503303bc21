/// MCP Protocol Types
///
/// JSON-RPC 2.0 request/response envelopes plus the MCP-specific shapes used
/// by `tools/list` and `tools/call`. Field names on the wire follow the MCP
/// specification (`inputSchema`, `isError`), so serde renames are applied
/// where Rust naming differs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::ToolError;

/// MCP protocol revision reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 error codes used by the server.
pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// JSON-RPC 2.0 request structure for MCP protocol.
///
/// `id` is `None` for notifications, which never receive a response.
#[derive(Deserialize, Debug, Clone)]
pub struct McpRequest {
    /// JSON-RPC version identifier, must be "2.0"
    #[allow(dead_code)]
    pub jsonrpc: String,
    /// Request ID for correlating responses. None indicates a notification.
    #[serde(default)]
    pub id: Option<Value>,
    /// MCP method name (e.g., "initialize", "tools/list", "tools/call")
    pub method: String,
    /// Method-specific parameters as JSON value
    #[serde(default)]
    pub params: Option<Value>,
}

impl McpRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response structure for MCP protocol.
///
/// Exactly one of `result` or `error` is present.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

impl McpResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, error: McpError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC 2.0 error structure.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct McpError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpError {
    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self {
            code: PARSE_ERROR,
            message: format!("Parse error: {}", detail),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("Method not found: {}", method),
            data: None,
        }
    }

    pub fn invalid_params() -> Self {
        Self {
            code: INVALID_PARAMS,
            message: "Invalid params".to_string(),
            data: None,
        }
    }

    pub fn internal_error(detail: impl std::fmt::Display) -> Self {
        Self {
            code: INTERNAL_ERROR,
            message: format!("Internal error: {}", detail),
            data: None,
        }
    }
}

/// MCP tool definition structure.
///
/// Serialized as-is into the `tools/list` result.
#[derive(Serialize, Debug, Clone)]
pub struct McpTool {
    /// Unique tool identifier (e.g., "run_pagespeed_test")
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema defining the tool's input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// `tools/call` request params.
#[derive(Deserialize, Debug, Clone)]
pub struct CallToolParams {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// One item of a tool result's `content` array.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

/// Terminal response of a `tools/call` request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolResult {
    /// Wraps a JSON payload, pretty-printed with a two-space indent. Object
    /// keys keep the order they arrived in.
    pub fn success(payload: &Value) -> Self {
        let text = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
        Self {
            content: vec![ToolContent::Text { text }],
            is_error: false,
        }
    }

    pub fn error(err: &ToolError) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: format!("Error: {}", err),
            }],
            is_error: true,
        }
    }

    /// Text of the first content item, if any.
    #[cfg(test)]
    pub fn text(&self) -> Option<&str> {
        self.content.first().map(|c| match c {
            ToolContent::Text { text } => text.as_str(),
        })
    }
}

impl From<Result<Value, ToolError>> for ToolResult {
    fn from(outcome: Result<Value, ToolError>) -> Self {
        match outcome {
            Ok(payload) => Self::success(&payload),
            Err(err) => Self::error(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_result_is_pretty_printed() {
        let result = ToolResult::success(&json!({"id": "example.com"}));
        assert_eq!(result.text(), Some("{\n  \"id\": \"example.com\"\n}"));
        assert!(!result.is_error);
    }

    #[test]
    fn tool_result_wire_shape() {
        let result = ToolResult::error(&ToolError::UnknownTool("nope".into()));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "content": [{"type": "text", "text": "Error: Unknown tool: nope"}],
                "isError": true
            })
        );
    }

    #[test]
    fn response_omits_absent_fields() {
        let ok = serde_json::to_value(McpResponse::success(Some(json!(1)), json!({}))).unwrap();
        assert_eq!(ok, json!({"jsonrpc": "2.0", "id": 1, "result": {}}));

        let err = serde_json::to_value(McpResponse::error(
            Some(json!("a")),
            McpError::method_not_found("resources/list"),
        ))
        .unwrap();
        assert_eq!(err["error"]["code"], json!(-32601));
        assert_eq!(err["error"]["message"], json!("Method not found: resources/list"));
        assert!(err.get("result").is_none());
    }

    #[test]
    fn request_without_id_is_notification() {
        let req: McpRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert!(req.is_notification());
        assert!(req.params.is_none());
    }
}

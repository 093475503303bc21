/// Error Types
///
/// `ToolError` covers everything that can go wrong inside a single tool call.
/// It never crosses the dispatch boundary as a fault: the registry converts it
/// into an `isError` tool result whose text is `"Error: "` followed by the
/// `Display` output below. `ServerError` covers startup failures, which are
/// the only errors that terminate the process.

use thiserror::Error;

/// Failure of a single `tools/call` request.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The call named a tool that is not in the registry.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The arguments did not satisfy the tool's input schema.
    #[error("Invalid arguments for {tool}: {detail}")]
    InvalidArguments { tool: &'static str, detail: String },

    /// The PageSpeed API answered with a non-success status.
    #[error("PageSpeed API error: {0}")]
    Api(String),

    /// The request never produced a response (DNS, TLS, connection reset, ...).
    #[error("PageSpeed API request failed: {0}")]
    Request(String),

    /// The PageSpeed API answered 2xx but the body was not JSON.
    #[error("Failed to parse PageSpeed API response: {0}")]
    InvalidResponse(String),
}

impl ToolError {
    pub fn invalid_arguments(tool: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool,
            detail: detail.into(),
        }
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        // The URL carries the caller's API key; keep it out of the message.
        let err = err.without_url();
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// Fatal startup failure.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Tool Registry
///
/// The set of tools is closed: `ToolId` enumerates every tool this server
/// knows and `ToolRegistry::dispatch` matches on it exhaustively, so adding a
/// tool means adding a variant and the compiler points at every place that
/// has to handle it. The registry is built once at startup and only read
/// afterwards, so it can be shared across tasks without locking.

use serde_json::Value;
use tracing::{debug, warn};

use crate::core::error::ToolError;
use crate::core::protocol::{McpTool, ToolResult};
use crate::tools::pagespeed::{self, PageSpeedClient, RunPageSpeedTestParams};

/// Identifier of a registered tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolId {
    RunPageSpeedTest,
}

impl ToolId {
    /// Every tool, in `tools/list` order.
    pub const ALL: [ToolId; 1] = [ToolId::RunPageSpeedTest];

    pub fn name(self) -> &'static str {
        match self {
            ToolId::RunPageSpeedTest => pagespeed::TOOL_NAME,
        }
    }

    /// Exact, case-sensitive lookup by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    fn descriptor(self) -> McpTool {
        match self {
            ToolId::RunPageSpeedTest => pagespeed::descriptor(),
        }
    }
}

/// Registry of available MCP tools and the collaborators their handlers need.
pub struct ToolRegistry {
    tools: Vec<McpTool>,
    pagespeed: PageSpeedClient,
}

impl ToolRegistry {
    pub fn new(pagespeed: PageSpeedClient) -> Self {
        Self {
            tools: ToolId::ALL.iter().map(|tool| tool.descriptor()).collect(),
            pagespeed,
        }
    }

    /// Metadata for every registered tool.
    pub fn list_tools(&self) -> &[McpTool] {
        &self.tools
    }

    /// Route a named call to its handler.
    ///
    /// Never fails: unknown names, invalid arguments and remote failures all
    /// come back as an `isError` result.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> ToolResult {
        let outcome = match ToolId::from_name(name) {
            Some(tool) => self.dispatch(tool, arguments).await,
            None => Err(ToolError::UnknownTool(name.to_string())),
        };

        match &outcome {
            Ok(_) => debug!(tool = name, "tool call succeeded"),
            Err(err) => warn!(tool = name, error = %err, "tool call failed"),
        }
        ToolResult::from(outcome)
    }

    async fn dispatch(&self, tool: ToolId, arguments: Value) -> Result<Value, ToolError> {
        match tool {
            ToolId::RunPageSpeedTest => {
                let params = RunPageSpeedTestParams::parse(arguments)?;
                self.pagespeed.run(&params).await
            }
        }
    }
}

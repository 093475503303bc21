/// PageSpeed Insights Tool
///
/// Implements `run_pagespeed_test`: parses untyped call arguments into a
/// validated `RunPageSpeedTestParams`, maps them onto the PageSpeed Insights
/// v5 query string and relays the JSON report unmodified. The report body is
/// never inspected.

use reqwest::Client as HttpClient;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use crate::core::error::{ServerError, ToolError};
use crate::core::protocol::McpTool;

pub const TOOL_NAME: &str = "run_pagespeed_test";

/// PageSpeed Insights v5 endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/pagespeedonline/v5/runPagespeed";

/// Device profile the audit is run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Mobile,
    Desktop,
}

impl Strategy {
    pub const ALL: [Strategy; 2] = [Strategy::Mobile, Strategy::Desktop];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Mobile => "mobile",
            Strategy::Desktop => "desktop",
        }
    }
}

/// Lighthouse audit category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Accessibility,
    BestPractices,
    Performance,
    Pwa,
    Seo,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Accessibility,
        Category::BestPractices,
        Category::Performance,
        Category::Pwa,
        Category::Seo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Accessibility => "accessibility",
            Category::BestPractices => "best-practices",
            Category::Performance => "performance",
            Category::Pwa => "pwa",
            Category::Seo => "seo",
        }
    }
}

/// Validated arguments of a `run_pagespeed_test` call.
///
/// Only `parse` constructs this, so every field already satisfies the input
/// schema by the time the fetch adapter sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPageSpeedTestParams {
    /// Page to audit, exactly as the caller supplied it (known to parse as a URL).
    pub url: String,
    pub strategy: Strategy,
    /// Requested categories in caller order; never empty.
    pub category: Vec<Category>,
    pub locale: String,
    pub api_key: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParams {
    url: String,
    #[serde(default)]
    strategy: Strategy,
    #[serde(default = "default_categories")]
    category: Vec<Category>,
    #[serde(default = "default_locale")]
    locale: String,
    #[serde(default, deserialize_with = "present_string")]
    api_key: Option<String>,
}

/// Optional field that, when present, must be a string (`null` included).
fn present_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(Some)
}

fn default_categories() -> Vec<Category> {
    vec![Category::Performance]
}

fn default_locale() -> String {
    "en".to_string()
}

impl RunPageSpeedTestParams {
    /// Parse and validate raw call arguments, applying defaults for absent fields.
    pub fn parse(arguments: Value) -> Result<Self, ToolError> {
        let raw: RawParams = serde_json::from_value(arguments)
            .map_err(|e| ToolError::invalid_arguments(TOOL_NAME, e.to_string()))?;

        // The parsed form is only a check; the caller's spelling goes on the wire.
        Url::parse(&raw.url)
            .map_err(|e| ToolError::invalid_arguments(TOOL_NAME, format!("url: {}", e)))?;

        if raw.category.is_empty() {
            return Err(ToolError::invalid_arguments(
                TOOL_NAME,
                "category: must contain at least one entry",
            ));
        }

        Ok(Self {
            url: raw.url,
            strategy: raw.strategy,
            category: raw.category,
            locale: raw.locale,
            api_key: raw.api_key.filter(|key| !key.is_empty()),
        })
    }
}

/// Tool metadata advertised by `tools/list`.
pub fn descriptor() -> McpTool {
    McpTool {
        name: TOOL_NAME.to_string(),
        description: "Run a PageSpeed Insights test on a URL. Tests page performance, \
                      accessibility, SEO, and best practices."
            .to_string(),
        input_schema: input_schema(),
    }
}

fn input_schema() -> Value {
    let strategies: Vec<&str> = Strategy::ALL.iter().map(|s| s.as_str()).collect();
    let categories: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();

    json!({
        "type": "object",
        "properties": {
            "url": {
                "type": "string",
                "format": "uri",
                "description": "The URL of the page to analyze"
            },
            "strategy": {
                "type": "string",
                "enum": strategies,
                "default": Strategy::default().as_str()
            },
            "category": {
                "type": "array",
                "items": {
                    "type": "string",
                    "enum": categories
                },
                "minItems": 1,
                "default": [Category::Performance.as_str()]
            },
            "locale": {
                "type": "string",
                "default": "en"
            },
            "apiKey": {
                "type": "string",
                "description": "Optional PageSpeed Insights API key"
            }
        },
        "required": ["url"],
        "additionalProperties": false,
        "$schema": "http://json-schema.org/draft-07/schema#"
    })
}

/// Fetch adapter for the PageSpeed Insights API.
///
/// Holds one connection-pooling HTTP client for the life of the process. No
/// request timeout is configured, so a call waits as long as the remote
/// service and the transport allow.
#[derive(Debug, Clone)]
pub struct PageSpeedClient {
    http: HttpClient,
    endpoint: Url,
}

impl PageSpeedClient {
    pub fn new() -> Result<Self, ServerError> {
        let endpoint = Url::parse(DEFAULT_ENDPOINT)
            .map_err(|e| ServerError::Config(format!("invalid PageSpeed endpoint: {}", e)))?;
        Self::with_base_url(endpoint)
    }

    pub fn with_base_url(endpoint: Url) -> Result<Self, ServerError> {
        let http = HttpClient::builder()
            .user_agent(concat!("pagespeed-mcp-server/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, endpoint })
    }

    /// Build the full request URL for a validated call.
    ///
    /// Query order is `url`, `strategy`, one `category` per entry, `locale`,
    /// then `key` only when the caller supplied one.
    pub fn request_url(&self, params: &RunPageSpeedTestParams) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("url", &params.url);
            query.append_pair("strategy", params.strategy.as_str());
            for category in &params.category {
                query.append_pair("category", category.as_str());
            }
            query.append_pair("locale", &params.locale);
            if let Some(key) = &params.api_key {
                query.append_pair("key", key);
            }
        }
        url
    }

    /// Run one audit and return the raw JSON report.
    pub async fn run(&self, params: &RunPageSpeedTestParams) -> Result<Value, ToolError> {
        info!(
            page = %params.url,
            strategy = params.strategy.as_str(),
            categories = params.category.len(),
            "running PageSpeed test"
        );

        let response = self.http.get(self.request_url(params)).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), page = %params.url, "PageSpeed API returned an error");
            let reason = status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.as_str().to_string());
            return Err(ToolError::Api(reason));
        }

        let body = response.text().await?;
        debug!(bytes = body.len(), "received PageSpeed report");
        serde_json::from_str(&body).map_err(|e| ToolError::InvalidResponse(e.to_string()))
    }
}

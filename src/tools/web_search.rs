use super::registry::{parse_arguments, Tool, ToolParameters};
use crate::error::{GhostError, Result};
use crate::util::excerpt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";
const DEFAULT_MAX_RESULTS: usize = 5;
const MAX_RESULTS_LIMIT: usize = 10;
const SNIPPET_CHARS: usize = 400;
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Web search through the Tavily API.
pub struct WebSearchTool {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl WebSearchTool {
    pub const NAME: &'static str = "web_search";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(api_key, TAVILY_SEARCH_URL)
    }

    pub fn with_endpoint(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Deserialize)]
struct WebSearchArgs {
    query: String,
    #[serde(default)]
    max_results: Option<usize>,
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

fn format_results(results: &[TavilyResult]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }
    results
        .iter()
        .enumerate()
        .map(|(idx, result)| {
            format!(
                "{}. {} — {}\n{}",
                idx + 1,
                result.title.trim(),
                result.url.trim(),
                excerpt(result.content.trim(), SNIPPET_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns titles, URLs and snippets."
    }

    fn parameters(&self) -> ToolParameters {
        ToolParameters::new()
            .required("query", "string", "Search query")
            .optional("max_results", "integer", "Number of results (1-10)")
    }

    async fn execute(&self, arguments: Value) -> Result<String> {
        let args: WebSearchArgs = parse_arguments(Self::NAME, arguments)?;
        let query = args.query.trim();
        if query.is_empty() {
            return Err(GhostError::ToolArgumentParse {
                tool: Self::NAME.to_string(),
                reason: "query must not be empty".to_string(),
            });
        }
        let max_results = args
            .max_results
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, MAX_RESULTS_LIMIT);
        debug!(query, max_results, "web search");

        let failed = |reason: String| GhostError::tool_execution(Self::NAME, reason);
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(SEARCH_TIMEOUT)
            .json(&TavilyRequest {
                api_key: &self.api_key,
                query,
                max_results,
            })
            .send()
            .await
            .map_err(|e| failed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("HTTP {status}: {}", excerpt(body.trim(), 200))));
        }
        let body: TavilyResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("undecodable response: {e}")))?;
        Ok(format_results(&body.results))
    }
}

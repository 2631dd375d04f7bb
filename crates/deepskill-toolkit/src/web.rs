//! Web research tools: `web_search` (Tavily) and `fetch_url`.

use std::time::Duration;

use async_trait::async_trait;
use deepskill_core::tools::{Tool, ToolContext, ToolParameterSchema, ToolResult, ToolSchema};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const USER_AGENT: &str = "deepskill/0.1";
pub const DEFAULT_TAVILY_URL: &str = "https://api.tavily.com/search";
pub const DEFAULT_FETCH_MAX_CHARS: usize = 20_000;

#[derive(Debug, Clone)]
pub struct TavilyConfig {
    pub api_key: String,
    pub api_url: Option<String>,
}

pub struct TavilySearchTool {
    client: Client,
    config: TavilyConfig,
}

impl TavilySearchTool {
    pub fn new(config: TavilyConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .user_agent(USER_AGENT)
                .timeout(Duration::from_secs(60))
                .build()?,
            config,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    max_results: Option<u8>,
    #[serde(default)]
    topic: Option<String>,
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_results: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<&'a str>,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
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

#[async_trait]
impl Tool for TavilySearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "web_search",
            "Search the web and return an answer with the top result titles, URLs and snippets",
            ToolParameterSchema::object(
                [
                    ("query", ToolParameterSchema::string("Search query")),
                    (
                        "max_results",
                        ToolParameterSchema::integer("Number of results (default: 5)"),
                    ),
                    (
                        "topic",
                        ToolParameterSchema::string_enum(
                            "Search topic",
                            ["general", "news", "finance"],
                        ),
                    ),
                ],
                &["query"],
            ),
        )
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> anyhow::Result<ToolResult> {
        let args: SearchArgs = serde_json::from_value(args)?;
        let url = self.config.api_url.as_deref().unwrap_or(DEFAULT_TAVILY_URL);
        let body = TavilyRequest {
            api_key: &self.config.api_key,
            query: &args.query,
            max_results: Some(args.max_results.unwrap_or(5)),
            topic: args.topic.as_deref(),
            include_answer: true,
        };

        tracing::info!(query = %args.query, "calling Tavily");
        let response = match self.client.post(url).json(&body).send().await {
            Ok(resp) => resp,
            Err(e) => return Ok(ToolResult::text(&ctx, format!("Error: search request failed: {e}"))),
        };
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "Tavily returned an error");
            return Ok(ToolResult::text(&ctx, format!("Error: search failed ({status}): {text}")));
        }
        let data: TavilyResponse = response.json().await?;

        let mut lines = Vec::new();
        if let Some(answer) = &data.answer {
            lines.push(format!("Answer: {answer}"));
        }
        if data.results.is_empty() {
            lines.push("No results returned.".to_string());
        } else {
            lines.push("Top results:".to_string());
            for result in &data.results {
                lines.push(format!("- {} ({})", result.title, result.url));
                if !result.content.is_empty() {
                    lines.push(format!("  {}", result.content));
                }
            }
        }
        Ok(ToolResult::text(&ctx, lines.join("\n")))
    }
}

lazy_static! {
    static ref SCRIPT_OR_STYLE: Regex =
        Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>").unwrap();
    static ref TAG: Regex = Regex::new(r"(?s)<[^>]+>").unwrap();
    static ref BLANK_RUNS: Regex = Regex::new(r"\n\s*\n+").unwrap();
    static ref SPACE_RUNS: Regex = Regex::new(r"[ \t]+").unwrap();
}

/// Reduces an HTML page to readable text.
pub fn html_to_text(html: &str) -> String {
    let without_scripts = SCRIPT_OR_STYLE.replace_all(html, " ");
    let with_breaks = without_scripts
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("</p>", "\n\n")
        .replace("</div>", "\n")
        .replace("</li>", "\n");
    let stripped = TAG.replace_all(&with_breaks, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let spaced = SPACE_RUNS.replace_all(&decoded, " ");
    let lines: Vec<&str> = spaced.lines().map(str::trim).collect();
    BLANK_RUNS
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

pub struct FetchUrlTool {
    client: Client,
    max_chars: usize,
}

impl FetchUrlTool {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .user_agent(USER_AGENT)
                .timeout(Duration::from_secs(30))
                .build()?,
            max_chars: DEFAULT_FETCH_MAX_CHARS,
        })
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }
}

#[derive(Debug, Deserialize)]
struct FetchArgs {
    url: String,
}

#[async_trait]
impl Tool for FetchUrlTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "fetch_url",
            "Fetch a web page and return its readable text content",
            ToolParameterSchema::object(
                [("url", ToolParameterSchema::string("http(s) URL to fetch"))],
                &["url"],
            ),
        )
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> anyhow::Result<ToolResult> {
        let args: FetchArgs = serde_json::from_value(args)?;
        if !(args.url.starts_with("http://") || args.url.starts_with("https://")) {
            return Ok(ToolResult::text(&ctx, format!("Error: unsupported URL '{}'", args.url)));
        }

        tracing::info!(url = %args.url, "fetching url");
        let response = match self.client.get(&args.url).send().await {
            Ok(resp) => resp,
            Err(e) => return Ok(ToolResult::text(&ctx, format!("Error: fetch failed: {e}"))),
        };
        let status = response.status();
        if !status.is_success() {
            return Ok(ToolResult::text(&ctx, format!("Error: HTTP {status} for {}", args.url)));
        }
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("html"))
            .unwrap_or(false);
        let body = response.text().await?;
        let text = if is_html { html_to_text(&body) } else { body };

        let total = text.chars().count();
        let content: String = text.chars().take(self.max_chars).collect();
        Ok(ToolResult::json(
            &ctx,
            json!({
                "url": args.url,
                "content": content,
                "truncated": total > self.max_chars,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepskill_core::state::AgentStateSnapshot;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx() -> ToolContext {
        ToolContext::new(Arc::new(AgentStateSnapshot::default()))
    }

    #[test]
    fn html_is_flattened() {
        let html = "<html><head><style>p{}</style><script>x()</script></head>\
                    <body><h1>Title</h1><p>One &amp; two</p><p>Three</p></body></html>";
        assert_eq!(html_to_text(html), "Title One & two\n\nThree");
    }

    #[tokio::test]
    async fn search_formats_answer_and_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({"query": "rust skills", "max_results": 5})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "answer": "Skills are folders.",
                "results": [{"title": "Docs", "url": "https://x.test", "content": "snippet"}]
            })))
            .mount(&server)
            .await;

        let tool = TavilySearchTool::new(TavilyConfig {
            api_key: "k".into(),
            api_url: Some(format!("{}/search", server.uri())),
        })
        .unwrap();
        let result = tool.execute(json!({"query": "rust skills"}), ctx()).await.unwrap();
        assert_eq!(
            result.message().content.to_text(),
            "Answer: Skills are folders.\nTop results:\n- Docs (https://x.test)\n  snippet"
        );
    }

    #[tokio::test]
    async fn fetch_truncates_and_reports_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<p>abcdefghij</p>", "text/html"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tool = FetchUrlTool::new().unwrap().with_max_chars(4);
        let ok = tool
            .execute(json!({"url": format!("{}/page", server.uri())}), ctx())
            .await
            .unwrap();
        let body = ok.message().content.as_json().unwrap().clone();
        assert_eq!(body["content"], "abcd");
        assert_eq!(body["truncated"], true);

        let missing = tool
            .execute(json!({"url": format!("{}/gone", server.uri())}), ctx())
            .await
            .unwrap();
        assert!(missing.message().content.to_text().starts_with("Error: HTTP 404"));

        let bad = tool.execute(json!({"url": "file:///etc/passwd"}), ctx()).await.unwrap();
        assert!(bad.message().content.to_text().starts_with("Error: unsupported URL"));
    }
}

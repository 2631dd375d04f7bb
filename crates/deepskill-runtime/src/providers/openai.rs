//! OpenAI-compatible chat completions with native tool calling. Works with
//! any endpoint speaking the same protocol (Doubao/Ark, DashScope compatible
//! mode for Tongyi and DeepSeek models, local gateways).

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use deepskill_core::llm::{LanguageModel, LlmRequest, LlmResponse, TokenUsage};
use deepskill_core::messaging::{AgentMessage, MessageContent, MessageMetadata, MessageRole, ToolCall};
use deepskill_core::tools::ToolSchema;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DOUBAO_BASE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";
pub const DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    /// Base URL (`.../v1`) or full `.../chat/completions` URL.
    pub api_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub max_retries: u32,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            api_url: None,
            temperature: None,
            max_tokens: None,
            max_retries: 2,
            timeout: Duration::from_secs(300),
        }
    }

    /// Doubao models served by Volcengine Ark.
    pub fn doubao(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(api_key, model).with_api_url(Some(DOUBAO_BASE_URL.to_string()))
    }

    /// Tongyi (qwen) or DeepSeek models through DashScope's compatible mode.
    pub fn dashscope(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(api_key, model).with_api_url(Some(DASHSCOPE_BASE_URL.to_string()))
    }

    pub fn with_api_url(mut self, api_url: Option<String>) -> Self {
        self.api_url = api_url;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn completions_url(&self) -> String {
        let base = self
            .api_url
            .as_deref()
            .unwrap_or(OPENAI_BASE_URL)
            .trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{base}/chat/completions")
        }
    }
}

pub struct OpenAiChatModel {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiChatModel {
    pub fn new(config: OpenAiConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: super::http_client(config.timeout)?,
            config,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize, Debug, PartialEq)]
struct OpenAiMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OpenAiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAiMessage {
    fn plain(role: &'static str, content: String) -> Self {
        Self {
            role,
            content: Some(content),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: OpenAiFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct OpenAiFunctionCall {
    name: String,
    /// JSON-encoded arguments.
    #[serde(default)]
    arguments: String,
}

#[derive(Serialize)]
struct OpenAiTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolSchema,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAiToolCall>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

fn to_openai_messages(request: &LlmRequest) -> Vec<OpenAiMessage> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if !request.system_prompt.is_empty() {
        messages.push(OpenAiMessage::plain("system", request.system_prompt.clone()));
    }

    // Tool results are only valid after the assistant turn that requested them.
    let mut open_calls: HashSet<String> = HashSet::new();
    for msg in &request.messages {
        match msg.role {
            MessageRole::User => messages.push(OpenAiMessage::plain("user", msg.content.to_text())),
            MessageRole::System => {
                messages.push(OpenAiMessage::plain("system", msg.content.to_text()))
            }
            MessageRole::Agent => {
                let calls = msg.tool_calls();
                open_calls = calls.iter().map(|c| c.id.clone()).collect();
                let text = msg.content.to_text();
                messages.push(OpenAiMessage {
                    role: "assistant",
                    content: if text.is_empty() && !calls.is_empty() {
                        None
                    } else {
                        Some(text)
                    },
                    tool_calls: calls
                        .iter()
                        .map(|call| OpenAiToolCall {
                            id: call.id.clone(),
                            kind: function_type(),
                            function: OpenAiFunctionCall {
                                name: call.name.clone(),
                                arguments: call.args.to_string(),
                            },
                        })
                        .collect(),
                    tool_call_id: None,
                });
            }
            MessageRole::Tool => {
                let Some(call_id) = msg.tool_call_id().filter(|id| open_calls.contains(*id)) else {
                    tracing::warn!("skipping tool message without a matching tool call");
                    continue;
                };
                messages.push(OpenAiMessage {
                    role: "tool",
                    content: Some(msg.content.to_text()),
                    tool_calls: Vec::new(),
                    tool_call_id: Some(call_id.to_string()),
                });
            }
        }
    }
    messages
}

fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "tool call arguments are not valid JSON");
        Value::String(raw.to_string())
    })
}

fn to_agent_message(message: ChoiceMessage) -> AgentMessage {
    let tool_calls: Vec<ToolCall> = message
        .tool_calls
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            args: parse_arguments(&call.function.arguments),
            name: call.function.name,
        })
        .collect();
    AgentMessage {
        role: MessageRole::Agent,
        content: MessageContent::Text(message.content.unwrap_or_default()),
        metadata: (!tool_calls.is_empty()).then(|| MessageMetadata {
            tool_calls,
            ..MessageMetadata::default()
        }),
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn generate(&self, request: LlmRequest) -> anyhow::Result<LlmResponse> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: to_openai_messages(&request),
            tools: request
                .tools
                .iter()
                .map(|schema| OpenAiTool {
                    kind: "function",
                    function: schema,
                })
                .collect(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let url = self.config.completions_url();

        tracing::debug!(
            model = %self.config.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "sending chat completion request"
        );

        let response = super::send_with_retry("OpenAI", self.config.max_retries, || {
            self.client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&body)
        })
        .await?;

        let data: ChatResponse = response.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("OpenAI response missing choices"))?;

        Ok(LlmResponse {
            message: to_agent_message(choice.message),
            usage: data.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

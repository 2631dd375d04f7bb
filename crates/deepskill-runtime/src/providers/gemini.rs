use std::time::Duration;

use async_trait::async_trait;
use deepskill_core::llm::{LanguageModel, LlmRequest, LlmResponse, TokenUsage};
use deepskill_core::messaging::{AgentMessage, MessageContent, MessageMetadata, MessageRole, ToolCall};
use deepskill_core::tools::ToolSchema;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub api_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_retries: u32,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            api_url: None,
            temperature: None,
            max_retries: 2,
        }
    }

    pub fn with_api_url(mut self, api_url: Option<String>) -> Self {
        self.api_url = api_url;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

pub struct GeminiChatModel {
    client: Client,
    config: GeminiConfig,
}

impl GeminiChatModel {
    pub fn new(config: GeminiConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: super::http_client(Duration::from_secs(300))?,
            config,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTools>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl GeminiPart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTools {
    function_declarations: Vec<Value>,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

/// Function declarations accept an OpenAPI subset; `default` is not part of it.
fn declaration(schema: &ToolSchema) -> Value {
    let mut parameters = serde_json::to_value(&schema.parameters).unwrap_or(Value::Null);
    strip_keys(&mut parameters, &["default", "additionalProperties"]);
    json!({
        "name": schema.name,
        "description": schema.description,
        "parameters": parameters,
    })
}

fn strip_keys(value: &mut Value, keys: &[&str]) {
    match value {
        Value::Object(map) => {
            for key in keys {
                map.remove(*key);
            }
            for child in map.values_mut() {
                strip_keys(child, keys);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| strip_keys(v, keys)),
        _ => {}
    }
}

fn to_gemini_contents(request: &LlmRequest) -> (Vec<GeminiContent>, Option<GeminiContent>) {
    let mut contents = Vec::new();
    for message in &request.messages {
        let content = match message.role {
            MessageRole::User | MessageRole::System => GeminiContent {
                role: "user".into(),
                parts: vec![GeminiPart::text(message.content.to_text())],
            },
            MessageRole::Agent => {
                let mut parts = Vec::new();
                let text = message.content.to_text();
                if !text.is_empty() {
                    parts.push(GeminiPart::text(text));
                }
                parts.extend(message.tool_calls().iter().map(|call| GeminiPart {
                    function_call: Some(FunctionCall {
                        name: call.name.clone(),
                        args: call.args.clone(),
                    }),
                    ..GeminiPart::default()
                }));
                GeminiContent {
                    role: "model".into(),
                    parts,
                }
            }
            MessageRole::Tool => {
                let name = message
                    .metadata
                    .as_ref()
                    .and_then(|m| m.name.clone())
                    .unwrap_or_else(|| "tool".into());
                GeminiContent {
                    role: "function".into(),
                    parts: vec![GeminiPart {
                        function_response: Some(FunctionResponse {
                            name,
                            response: json!({ "content": message.content.to_text() }),
                        }),
                        ..GeminiPart::default()
                    }],
                }
            }
        };
        contents.push(content);
    }

    let system_instruction = if request.system_prompt.trim().is_empty() {
        None
    } else {
        Some(GeminiContent {
            role: "system".into(),
            parts: vec![GeminiPart::text(request.system_prompt.clone())],
        })
    };

    (contents, system_instruction)
}

#[async_trait]
impl LanguageModel for GeminiChatModel {
    async fn generate(&self, request: LlmRequest) -> anyhow::Result<LlmResponse> {
        let (contents, system_instruction) = to_gemini_contents(&request);
        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![GeminiTools {
                function_declarations: request.tools.iter().map(declaration).collect(),
            }]
        };
        let body = GeminiRequest {
            contents,
            system_instruction,
            tools,
            generation_config: self
                .config
                .temperature
                .map(|temperature| GenerationConfig { temperature }),
        };

        let base_url = self.config.api_url.as_deref().unwrap_or(GEMINI_BASE_URL);
        let url = format!("{}/models/{}:generateContent", base_url, self.config.model);

        tracing::debug!(model = %self.config.model, contents = body.contents.len(), "sending Gemini request");
        let response = super::send_with_retry("Gemini", self.config.max_retries, || {
            self.client
                .post(&url)
                .query(&[("key", self.config.api_key.as_str())])
                .json(&body)
        })
        .await?;

        let data: GeminiResponse = response.json().await?;
        let parts = data
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .next()
            .map(|content| content.parts)
            .unwrap_or_default();

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for part in parts {
            if let Some(t) = part.text {
                text.push_str(&t);
            }
            if let Some(call) = part.function_call {
                tool_calls.push(ToolCall {
                    id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                    name: call.name,
                    args: call.args,
                });
            }
        }

        Ok(LlmResponse {
            message: AgentMessage {
                role: MessageRole::Agent,
                content: MessageContent::Text(text),
                metadata: (!tool_calls.is_empty()).then(|| MessageMetadata {
                    tool_calls,
                    ..MessageMetadata::default()
                }),
            },
            usage: data.usage_metadata.map(|u| TokenUsage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            }),
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

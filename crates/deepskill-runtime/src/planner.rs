use std::sync::Arc;

use async_trait::async_trait;
use deepskill_core::agent::{PlannerAction, PlannerContext, PlannerDecision, PlannerHandle};
use deepskill_core::llm::{LanguageModel, LlmRequest};
use deepskill_core::messaging::{AgentMessage, MessageContent, MessageMetadata, MessageRole, ToolCall};
use deepskill_core::state::AgentStateSnapshot;
use serde::Deserialize;
use serde_json::Value;

/// Planner that asks the model for the next step.
#[derive(Clone)]
pub struct LlmBackedPlanner {
    model: Arc<dyn LanguageModel>,
}

impl LlmBackedPlanner {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }
}

#[derive(Debug, Deserialize)]
struct TextToolCall {
    name: String,
    #[serde(default)]
    args: Value,
}

/// Shape accepted from models without native function calling.
#[derive(Debug, Deserialize)]
struct PlannerOutput {
    #[serde(default)]
    tool_calls: Vec<TextToolCall>,
    #[serde(default)]
    response: Option<String>,
}

#[async_trait]
impl PlannerHandle for LlmBackedPlanner {
    async fn plan(
        &self,
        context: PlannerContext,
        _state: Arc<AgentStateSnapshot>,
    ) -> anyhow::Result<PlannerDecision> {
        let request = LlmRequest::new(context.system_prompt, context.history).with_tools(context.tools);
        let response = self.model.generate(request).await?;
        if let Some(usage) = &response.usage {
            tracing::debug!(
                model = self.model.model_name(),
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "model usage"
            );
        }
        Ok(PlannerDecision {
            next_action: decide(response.message),
        })
    }
}

fn decide(message: AgentMessage) -> PlannerAction {
    if !message.tool_calls().is_empty() {
        let calls = message.tool_calls().to_vec();
        return PlannerAction::CallTools { message, calls };
    }

    let parsed = match &message.content {
        MessageContent::Json(value) => serde_json::from_value::<PlannerOutput>(value.clone()).ok(),
        MessageContent::Text(text) => parse_from_text(text),
    };

    match parsed {
        Some(output) if !output.tool_calls.is_empty() => {
            let calls: Vec<ToolCall> = output
                .tool_calls
                .into_iter()
                .map(|call| ToolCall {
                    id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                    name: call.name,
                    args: call.args,
                })
                .collect();
            let message = AgentMessage {
                role: MessageRole::Agent,
                content: MessageContent::Text(output.response.unwrap_or_default()),
                metadata: Some(MessageMetadata {
                    tool_calls: calls.clone(),
                    ..MessageMetadata::default()
                }),
            };
            PlannerAction::CallTools { message, calls }
        }
        Some(PlannerOutput {
            response: Some(text),
            ..
        }) => PlannerAction::Respond {
            message: AgentMessage::agent(text),
        },
        _ => PlannerAction::Respond {
            message: AgentMessage {
                role: MessageRole::Agent,
                content: MessageContent::Text(message.content.to_text()),
                metadata: message.metadata,
            },
        },
    }
}

fn parse_from_text(text: &str) -> Option<PlannerOutput> {
    let trimmed = text.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with("```")) {
        return None;
    }
    if let Some(parsed) = decode(trimmed) {
        return Some(parsed);
    }
    // ```json ... ```
    let without_ticks = trimmed.strip_prefix("```")?;
    let without_lang = without_ticks
        .trim_start_matches(|c: char| c.is_alphabetic())
        .trim_start();
    let inner = match without_lang.rfind("```") {
        Some(end) => &without_lang[..end],
        None => without_lang,
    };
    decode(inner.trim())
}

fn decode(s: &str) -> Option<PlannerOutput> {
    let value: Value = serde_json::from_str(s).ok()?;
    if value.get("tool_calls").is_none() && value.get("response").is_none() {
        return None;
    }
    serde_json::from_value(value).ok()
}

//! Condenses older history once the conversation grows past a token budget.

use std::sync::Arc;

use async_trait::async_trait;
use deepskill_core::llm::{LanguageModel, LlmRequest};
use deepskill_core::messaging::{AgentMessage, MessageRole};

use crate::middleware::{AgentMiddleware, MiddlewareContext};
use crate::prompts::{SUMMARY_MESSAGE_PREFIX, SUMMARY_PROMPT};

/// Rough token estimate: four characters per token.
pub fn approximate_tokens(messages: &[AgentMessage]) -> usize {
    let chars: usize = messages
        .iter()
        .map(|m| {
            m.content.to_text().chars().count()
                + m.tool_calls()
                    .iter()
                    .map(|c| c.name.len() + c.args.to_string().len())
                    .sum::<usize>()
        })
        .sum();
    chars / 4
}

/// Index where kept history starts. Moves earlier so a tool result is never
/// separated from the agent message that requested it.
fn cut_point(messages: &[AgentMessage], keep: usize) -> usize {
    let mut cut = messages.len().saturating_sub(keep);
    while cut > 0 && cut < messages.len() && messages[cut].role == MessageRole::Tool {
        cut -= 1;
    }
    cut
}

fn render(messages: &[AgentMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                MessageRole::User => "user",
                MessageRole::Agent => "assistant",
                MessageRole::Tool => "tool",
                MessageRole::System => "system",
            };
            let mut line = format!("{role}: {}", m.content.to_text());
            for call in m.tool_calls() {
                line.push_str(&format!("\n  [tool call] {}({})", call.name, call.args));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct SummarizationMiddleware {
    model: Arc<dyn LanguageModel>,
    trigger_tokens: usize,
    keep_messages: usize,
}

impl SummarizationMiddleware {
    pub fn new(model: Arc<dyn LanguageModel>, trigger_tokens: usize, keep_messages: usize) -> Self {
        Self {
            model,
            trigger_tokens,
            keep_messages,
        }
    }

    async fn summarize(&self, messages: &[AgentMessage]) -> anyhow::Result<String> {
        let prompt = SUMMARY_PROMPT.replace("{messages}", &render(messages));
        let response = self
            .model
            .generate(LlmRequest::new("", vec![AgentMessage::user(prompt)]))
            .await?;
        Ok(response.message.content.to_text().trim().to_string())
    }
}

#[async_trait]
impl AgentMiddleware for SummarizationMiddleware {
    fn id(&self) -> &'static str {
        "summarization"
    }

    async fn modify_model_request(&self, ctx: &mut MiddlewareContext<'_>) -> anyhow::Result<()> {
        let tokens = approximate_tokens(&ctx.request.messages);
        if tokens <= self.trigger_tokens {
            return Ok(());
        }
        let cut = cut_point(&ctx.request.messages, self.keep_messages);
        if cut == 0 {
            return Ok(());
        }

        tracing::info!(tokens, summarized = cut, kept = ctx.request.messages.len() - cut, "summarizing history");
        let summary = match self.summarize(&ctx.request.messages[..cut]).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(error = %e, "summarization failed, keeping full history");
                return Ok(());
            }
        };

        let mut condensed = Vec::with_capacity(ctx.request.messages.len() - cut + 1);
        condensed.push(AgentMessage::user(format!("{SUMMARY_MESSAGE_PREFIX}\n\n{summary}")));
        condensed.extend_from_slice(&ctx.request.messages[cut..]);

        ctx.state
            .write()
            .map_err(|_| anyhow::anyhow!("agent state lock poisoned"))?
            .messages = condensed.clone();
        ctx.request.messages = condensed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::ModelRequest;
    use deepskill_core::llm::LlmResponse;
    use deepskill_core::messaging::{MessageContent, MessageMetadata, ToolCall};
    use deepskill_core::state::AgentStateSnapshot;
    use serde_json::json;
    use std::sync::RwLock;

    struct SummaryModel;

    #[async_trait]
    impl LanguageModel for SummaryModel {
        async fn generate(&self, request: LlmRequest) -> anyhow::Result<LlmResponse> {
            assert!(request.messages[0].content.to_text().contains("<messages>"));
            Ok(LlmResponse::new(AgentMessage::agent("user wants a report")))
        }
    }

    fn conversation() -> Vec<AgentMessage> {
        let call = ToolCall {
            id: "c1".into(),
            name: "ls".into(),
            args: json!({"path": "/"}),
        };
        vec![
            AgentMessage::user("x".repeat(400)),
            AgentMessage {
                role: MessageRole::Agent,
                content: MessageContent::Text(String::new()),
                metadata: Some(MessageMetadata {
                    tool_calls: vec![call.clone()],
                    ..MessageMetadata::default()
                }),
            },
            AgentMessage::tool_result(&call, MessageContent::Text("[]".into())),
            AgentMessage::agent("nothing there"),
            AgentMessage::user("ok"),
        ]
    }

    #[test]
    fn cut_point_keeps_tool_results_with_their_call() {
        let messages = conversation();
        assert_eq!(cut_point(&messages, 2), 3);
        assert_eq!(cut_point(&messages, 3), 1);
        assert_eq!(cut_point(&messages, 10), 0);
    }

    #[tokio::test]
    async fn long_history_is_replaced_by_summary() {
        let middleware = SummarizationMiddleware::new(Arc::new(SummaryModel), 50, 3);
        let state = Arc::new(RwLock::new(AgentStateSnapshot {
            messages: conversation(),
            ..AgentStateSnapshot::default()
        }));
        let mut request = ModelRequest::new("System", conversation());
        let mut ctx = MiddlewareContext::with_request(&mut request, state.clone());
        middleware.modify_model_request(&mut ctx).await.unwrap();

        assert_eq!(request.messages.len(), 5);
        let summary = request.messages[0].content.to_text();
        assert!(summary.starts_with(SUMMARY_MESSAGE_PREFIX));
        assert!(summary.ends_with("user wants a report"));
        assert_eq!(request.messages[1].tool_calls().len(), 1);
        assert_eq!(state.read().unwrap().messages, request.messages);
    }

    #[tokio::test]
    async fn short_history_is_untouched() {
        let middleware = SummarizationMiddleware::new(Arc::new(SummaryModel), 5000, 4);
        let state = Arc::new(RwLock::new(AgentStateSnapshot::default()));
        let mut request = ModelRequest::new("System", conversation());
        let mut ctx = MiddlewareContext::with_request(&mut request, state);
        middleware.modify_model_request(&mut ctx).await.unwrap();
        assert_eq!(request.messages, conversation());
    }
}

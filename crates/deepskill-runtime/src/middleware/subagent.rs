//! Sub-agent delegation through the `task` tool.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use deepskill_core::agent::AgentHandle;
use deepskill_core::messaging::{AgentMessage, MessageContent};
use deepskill_core::prompts::{TASK_SYSTEM_PROMPT, TASK_TOOL_DESCRIPTION};
use deepskill_core::state::AgentStateSnapshot;
use deepskill_core::tools::{Tool, ToolBox, ToolContext, ToolParameterSchema, ToolResult, ToolSchema};
use serde::Deserialize;
use serde_json::Value;

use crate::middleware::{AgentMiddleware, MiddlewareContext};

#[derive(Debug, Clone)]
pub struct SubAgentDescriptor {
    pub name: String,
    pub description: String,
}

#[derive(Clone)]
pub struct SubAgentRegistration {
    pub descriptor: SubAgentDescriptor,
    pub agent: Arc<dyn AgentHandle>,
}

struct SubAgentRegistry {
    agents: BTreeMap<String, SubAgentRegistration>,
}

impl SubAgentRegistry {
    fn new(registrations: Vec<SubAgentRegistration>) -> Self {
        let agents = registrations
            .into_iter()
            .map(|reg| (reg.descriptor.name.clone(), reg))
            .collect();
        Self { agents }
    }

    fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    fn get(&self, name: &str) -> Option<Arc<dyn AgentHandle>> {
        self.agents.get(name).map(|reg| reg.agent.clone())
    }

    /// One `- name: description` line per agent.
    fn listing(&self) -> String {
        self.agents
            .values()
            .map(|reg| format!("- {}: {}", reg.descriptor.name, reg.descriptor.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs a registered sub-agent on a self-contained task description and
/// returns its final message.
pub struct TaskTool {
    registry: Arc<SubAgentRegistry>,
}

#[derive(Debug, Deserialize)]
struct TaskArgs {
    description: String,
    subagent_type: String,
}

#[async_trait]
impl Tool for TaskTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "task",
            TASK_TOOL_DESCRIPTION.replace("{other_agents}", &self.registry.listing()),
            ToolParameterSchema::object(
                [
                    (
                        "description",
                        ToolParameterSchema::string(
                            "Complete, self-contained description of the task for the subagent",
                        ),
                    ),
                    (
                        "subagent_type",
                        ToolParameterSchema::string_enum(
                            "Name of the subagent to launch",
                            self.registry.names(),
                        ),
                    ),
                ],
                &["description", "subagent_type"],
            ),
        )
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> anyhow::Result<ToolResult> {
        let args: TaskArgs = serde_json::from_value(args)?;
        let Some(agent) = self.registry.get(&args.subagent_type) else {
            return Ok(ToolResult::text(
                &ctx,
                format!(
                    "Unknown subagent '{}'. Available: {:?}",
                    args.subagent_type,
                    self.registry.names()
                ),
            ));
        };

        tracing::info!(subagent = %args.subagent_type, "delegating task");
        let response = agent
            .handle_message(
                AgentMessage::user(args.description),
                Arc::new(AgentStateSnapshot::default()),
            )
            .await?;

        Ok(match response.content {
            MessageContent::Text(text) => ToolResult::text(&ctx, text),
            MessageContent::Json(value) => ToolResult::json(&ctx, value),
        })
    }
}

pub struct SubAgentMiddleware {
    task_tool: Arc<TaskTool>,
}

impl SubAgentMiddleware {
    pub fn new(registrations: Vec<SubAgentRegistration>) -> Self {
        Self {
            task_tool: Arc::new(TaskTool {
                registry: Arc::new(SubAgentRegistry::new(registrations)),
            }),
        }
    }

    pub fn subagent_names(&self) -> Vec<String> {
        self.task_tool.registry.names()
    }
}

#[async_trait]
impl AgentMiddleware for SubAgentMiddleware {
    fn id(&self) -> &'static str {
        "subagent"
    }

    fn tools(&self) -> Vec<ToolBox> {
        vec![self.task_tool.clone()]
    }

    async fn modify_model_request(&self, ctx: &mut MiddlewareContext<'_>) -> anyhow::Result<()> {
        ctx.request.append_prompt(TASK_SYSTEM_PROMPT);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::ModelRequest;
    use deepskill_core::agent::AgentDescriptor;
    use serde_json::json;
    use std::sync::RwLock;

    struct StubAgent;

    #[async_trait]
    impl AgentHandle for StubAgent {
        async fn describe(&self) -> AgentDescriptor {
            AgentDescriptor {
                name: "stub".into(),
                version: "0.0.1".into(),
                description: None,
            }
        }

        async fn handle_message(
            &self,
            input: AgentMessage,
            _state: Arc<AgentStateSnapshot>,
        ) -> anyhow::Result<AgentMessage> {
            Ok(AgentMessage::agent(format!(
                "done: {}",
                input.content.to_text()
            )))
        }
    }

    fn middleware() -> SubAgentMiddleware {
        SubAgentMiddleware::new(vec![SubAgentRegistration {
            descriptor: SubAgentDescriptor {
                name: "search-agent".into(),
                description: "Web research specialist".into(),
            },
            agent: Arc::new(StubAgent),
        }])
    }

    fn ctx() -> ToolContext {
        ToolContext::new(Arc::new(AgentStateSnapshot::default())).with_call_id(Some("call-42".into()))
    }

    #[tokio::test]
    async fn task_runs_registered_subagent() {
        let tool = middleware().tools().remove(0);
        let result = tool
            .execute(
                json!({"description": "find prices", "subagent_type": "search-agent"}),
                ctx(),
            )
            .await
            .unwrap();
        let message = result.message();
        assert_eq!(message.content.as_text(), Some("done: find prices"));
        assert_eq!(message.tool_call_id(), Some("call-42"));
    }

    #[tokio::test]
    async fn unknown_subagent_lists_available_names() {
        let tool = middleware().tools().remove(0);
        let result = tool
            .execute(json!({"description": "x", "subagent_type": "nope"}), ctx())
            .await
            .unwrap();
        let text = result.message().content.to_text();
        assert!(text.starts_with("Unknown subagent 'nope'"));
        assert!(text.contains("search-agent"));
    }

    #[tokio::test]
    async fn schema_and_prompt_describe_subagents() {
        let middleware = middleware();
        let schema = middleware.tools()[0].schema();
        assert!(schema.description.contains("- search-agent: Web research specialist"));

        let mut request = ModelRequest::new("System", vec![]);
        let mut ctx = MiddlewareContext::with_request(
            &mut request,
            Arc::new(RwLock::new(AgentStateSnapshot::default())),
        );
        middleware.modify_model_request(&mut ctx).await.unwrap();
        assert!(request.system_prompt.contains("`task`"));
    }
}

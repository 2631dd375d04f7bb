use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::messaging::{AgentMessage, ToolCall};
use crate::state::AgentStateSnapshot;
use crate::tools::ToolSchema;

/// Planner interface responsible for deciding which actions to take.
#[async_trait]
pub trait PlannerHandle: Send + Sync {
    async fn plan(
        &self,
        context: PlannerContext,
        state: Arc<AgentStateSnapshot>,
    ) -> anyhow::Result<PlannerDecision>;
}

/// Minimal metadata about an agent instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerDecision {
    pub next_action: PlannerAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlannerAction {
    /// Execute the calls; `message` is the agent turn that requested them and
    /// is recorded in history before the results.
    CallTools {
        message: AgentMessage,
        calls: Vec<ToolCall>,
    },
    Respond {
        message: AgentMessage,
    },
    Terminate,
}

/// Context passed to planners: the prepared prompt, history and tool schemas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerContext {
    pub history: Vec<AgentMessage>,
    pub system_prompt: String,
    #[serde(default)]
    pub tools: Vec<ToolSchema>,
}

/// A fully configured agent that can answer a single message.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    async fn describe(&self) -> AgentDescriptor;

    async fn handle_message(
        &self,
        input: AgentMessage,
        state: Arc<AgentStateSnapshot>,
    ) -> anyhow::Result<AgentMessage>;
}

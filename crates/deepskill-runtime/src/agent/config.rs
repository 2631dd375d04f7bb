//! Configuration structs for deep agents.

use std::sync::{Arc, RwLock};

use deepskill_core::agent::PlannerHandle;
use deepskill_core::backend::Backend;
use deepskill_core::llm::LanguageModel;
use deepskill_core::persistence::{Checkpointer, ThreadId};
use deepskill_core::state::AgentStateSnapshot;
use deepskill_core::store::Store;
use deepskill_core::tools::ToolBox;

use crate::middleware::AgentMiddleware;
use crate::planner::LlmBackedPlanner;

pub const DEFAULT_RECURSION_LIMIT: usize = 25;
pub const DEFAULT_ASSISTANT_ID: &str = "agent";

/// Per-invocation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Conversation whose checkpoint is restored before and saved after the run.
    pub thread_id: ThreadId,
}

impl RunConfig {
    pub fn new(thread_id: impl Into<ThreadId>) -> Self {
        Self {
            thread_id: thread_id.into(),
        }
    }
}

/// What a [`BackendFactory`] gets to build the agent's storage from.
#[derive(Clone)]
pub struct BackendContext {
    /// Live state of the agent the backend is built for.
    pub state: Arc<RwLock<AgentStateSnapshot>>,
    pub store: Option<Arc<dyn Store>>,
    pub assistant_id: String,
}

/// Builds the file backend for an agent. Called once per agent, sub-agents
/// included, with that agent's own state.
pub type BackendFactory = Arc<dyn Fn(&BackendContext) -> Arc<dyn Backend> + Send + Sync>;

pub fn backend_factory<F>(factory: F) -> BackendFactory
where
    F: Fn(&BackendContext) -> Arc<dyn Backend> + Send + Sync + 'static,
{
    Arc::new(factory)
}

/// A sub-agent reachable through the `task` tool. Tools and model default
/// to the parent's when omitted.
#[derive(Clone)]
pub struct SubAgentConfig {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub tools: Option<Vec<ToolBox>>,
    pub model: Option<Arc<dyn LanguageModel>>,
}

impl SubAgentConfig {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system_prompt: system_prompt.into(),
            tools: None,
            model: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolBox>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }
}

impl IntoIterator for SubAgentConfig {
    type Item = SubAgentConfig;
    type IntoIter = std::iter::Once<SubAgentConfig>;

    fn into_iter(self) -> Self::IntoIter {
        std::iter::once(self)
    }
}

#[derive(Clone)]
pub struct SummarizationConfig {
    /// Approximate token count above which older history is summarized.
    pub trigger_tokens: usize,
    /// Most recent messages left verbatim.
    pub keep_messages: usize,
    /// Model writing the summary; the agent's model when `None`.
    pub model: Option<Arc<dyn LanguageModel>>,
}

impl SummarizationConfig {
    pub fn new(trigger_tokens: usize, keep_messages: usize) -> Self {
        Self {
            trigger_tokens,
            keep_messages,
            model: None,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self::new(5000, 4)
    }
}

/// Everything needed to assemble a [`DeepAgent`](super::DeepAgent).
pub struct DeepAgentConfig {
    pub system_prompt: String,
    pub model: Arc<dyn LanguageModel>,
    pub planner: Arc<dyn PlannerHandle>,
    pub tools: Vec<ToolBox>,
    pub subagents: Vec<SubAgentConfig>,
    /// Appended after the built-in middleware, in order.
    pub middleware: Vec<Arc<dyn AgentMiddleware>>,
    pub summarization: Option<SummarizationConfig>,
    /// Defaults to a [`StateBackend`](deepskill_toolkit::StateBackend) over the agent state.
    pub backend: Option<BackendFactory>,
    pub checkpointer: Option<Arc<dyn Checkpointer>>,
    pub store: Option<Arc<dyn Store>>,
    pub assistant_id: String,
    pub recursion_limit: usize,
    pub auto_general_purpose: bool,
    /// Advertise the `/memories/` route in the filesystem prompt.
    pub long_term_memory: bool,
}

impl DeepAgentConfig {
    pub fn new(system_prompt: impl Into<String>, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            planner: Arc::new(LlmBackedPlanner::new(model.clone())),
            model,
            tools: Vec::new(),
            subagents: Vec::new(),
            middleware: Vec::new(),
            summarization: None,
            backend: None,
            checkpointer: None,
            store: None,
            assistant_id: DEFAULT_ASSISTANT_ID.to_string(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            auto_general_purpose: true,
            long_term_memory: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarization_defaults_match_docs_profile() {
        let config = SummarizationConfig::default();
        assert_eq!(config.trigger_tokens, 5000);
        assert_eq!(config.keep_messages, 4);
        assert!(config.model.is_none());
    }

    #[test]
    fn subagent_config_iterates_as_single_item() {
        let configs: Vec<_> = SubAgentConfig::new("a", "b", "c").into_iter().collect();
        assert_eq!(configs.len(), 1);
        assert!(configs[0].tools.is_none());
    }
}

//! Fluent builder for [`DeepAgent`].

use std::sync::Arc;

use deepskill_core::agent::PlannerHandle;
use deepskill_core::llm::LanguageModel;
use deepskill_core::persistence::Checkpointer;
use deepskill_core::store::Store;
use deepskill_core::tools::ToolBox;

use super::config::{
    BackendFactory, DeepAgentConfig, SubAgentConfig, SummarizationConfig, DEFAULT_ASSISTANT_ID,
    DEFAULT_RECURSION_LIMIT,
};
use super::runtime::{create_deep_agent_from_config, DeepAgent};
use crate::middleware::AgentMiddleware;

/// Builder API to assemble a DeepAgent in a single fluent flow.
pub struct ConfigurableAgentBuilder {
    system_prompt: String,
    model: Option<Arc<dyn LanguageModel>>,
    planner: Option<Arc<dyn PlannerHandle>>,
    tools: Vec<ToolBox>,
    subagents: Vec<SubAgentConfig>,
    middleware: Vec<Arc<dyn AgentMiddleware>>,
    summarization: Option<SummarizationConfig>,
    backend: Option<BackendFactory>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    store: Option<Arc<dyn Store>>,
    assistant_id: String,
    recursion_limit: usize,
    auto_general_purpose: bool,
    long_term_memory: bool,
}

impl ConfigurableAgentBuilder {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            model: None,
            planner: None,
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

    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Replace the model-backed planner. A model is still required for
    /// summarization and sub-agents.
    pub fn with_planner(mut self, planner: Arc<dyn PlannerHandle>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn with_tool(mut self, tool: ToolBox) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tools<I>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = ToolBox>,
    {
        self.tools.extend(tools);
        self
    }

    pub fn with_subagent_config<I>(mut self, cfgs: I) -> Self
    where
        I: IntoIterator<Item = SubAgentConfig>,
    {
        self.subagents.extend(cfgs);
        self
    }

    /// Appended after the built-in middleware, in call order.
    pub fn with_middleware(mut self, middleware: Arc<dyn AgentMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn with_summarization(mut self, config: SummarizationConfig) -> Self {
        self.summarization = Some(config);
        self
    }

    pub fn with_backend(mut self, factory: BackendFactory) -> Self {
        self.backend = Some(factory);
        self
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_assistant_id(mut self, assistant_id: impl Into<String>) -> Self {
        self.assistant_id = assistant_id.into();
        self
    }

    /// Maximum steps per invocation; each model call and each tool round is one step.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is 0.
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        assert!(limit > 0, "recursion limit must be greater than 0");
        self.recursion_limit = limit;
        self
    }

    pub fn with_auto_general_purpose(mut self, enabled: bool) -> Self {
        self.auto_general_purpose = enabled;
        self
    }

    pub fn with_long_term_memory(mut self, enabled: bool) -> Self {
        self.long_term_memory = enabled;
        self
    }

    pub fn build(self) -> anyhow::Result<DeepAgent> {
        let model = self
            .model
            .ok_or_else(|| anyhow::anyhow!("a model is required to build a deep agent"))?;
        let mut config = DeepAgentConfig::new(self.system_prompt, model);
        if let Some(planner) = self.planner {
            config.planner = planner;
        }
        config.tools = self.tools;
        config.subagents = self.subagents;
        config.middleware = self.middleware;
        config.summarization = self.summarization;
        config.backend = self.backend;
        config.checkpointer = self.checkpointer;
        config.store = self.store;
        config.assistant_id = self.assistant_id;
        config.recursion_limit = self.recursion_limit;
        config.auto_general_purpose = self.auto_general_purpose;
        config.long_term_memory = self.long_term_memory;
        Ok(create_deep_agent_from_config(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_a_model() {
        let err = ConfigurableAgentBuilder::new("prompt").build().err().unwrap();
        assert!(err.to_string().contains("model is required"));
    }

    #[test]
    #[should_panic(expected = "recursion limit must be greater than 0")]
    fn zero_recursion_limit_panics() {
        let _ = ConfigurableAgentBuilder::new("prompt").with_recursion_limit(0);
    }
}

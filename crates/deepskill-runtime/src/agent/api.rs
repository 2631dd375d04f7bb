//! One-call construction of a deep agent.

use std::sync::Arc;

use deepskill_core::llm::LanguageModel;
use deepskill_core::persistence::Checkpointer;
use deepskill_core::store::Store;
use deepskill_core::tools::ToolBox;

use super::builder::ConfigurableAgentBuilder;
use super::config::{BackendFactory, SubAgentConfig, SummarizationConfig};
use super::runtime::DeepAgent;
use crate::middleware::AgentMiddleware;
use crate::providers::{OpenAiChatModel, OpenAiConfig};

/// Parameters for [`create_deep_agent`]. Unset fields fall back to the
/// builder defaults.
#[derive(Default)]
pub struct CreateDeepAgentParams {
    pub model: Option<Arc<dyn LanguageModel>>,
    pub tools: Vec<ToolBox>,
    pub system_prompt: String,
    pub middleware: Vec<Arc<dyn AgentMiddleware>>,
    pub subagents: Vec<SubAgentConfig>,
    pub summarization: Option<SummarizationConfig>,
    pub backend: Option<BackendFactory>,
    pub checkpointer: Option<Arc<dyn Checkpointer>>,
    pub store: Option<Arc<dyn Store>>,
    pub assistant_id: Option<String>,
    pub recursion_limit: Option<usize>,
}

/// OpenAI `gpt-4o-mini` with the key from `OPENAI_API_KEY`.
pub fn get_default_model() -> anyhow::Result<Arc<dyn LanguageModel>> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable is required"))?;
    let model: Arc<dyn LanguageModel> =
        Arc::new(OpenAiChatModel::new(OpenAiConfig::new(api_key, "gpt-4o-mini"))?);
    Ok(model)
}

pub fn create_deep_agent(params: CreateDeepAgentParams) -> anyhow::Result<DeepAgent> {
    let CreateDeepAgentParams {
        model,
        tools,
        system_prompt,
        middleware,
        subagents,
        summarization,
        backend,
        checkpointer,
        store,
        assistant_id,
        recursion_limit,
    } = params;

    let model = match model {
        Some(model) => model,
        None => get_default_model()?,
    };
    let mut builder = ConfigurableAgentBuilder::new(system_prompt)
        .with_model(model)
        .with_tools(tools)
        .with_subagent_config(subagents);
    for m in middleware {
        builder = builder.with_middleware(m);
    }
    if let Some(summarization) = summarization {
        builder = builder.with_summarization(summarization);
    }
    if let Some(backend) = backend {
        builder = builder.with_backend(backend);
    }
    if let Some(checkpointer) = checkpointer {
        builder = builder.with_checkpointer(checkpointer);
    }
    if let Some(store) = store {
        builder = builder.with_store(store);
    }
    if let Some(assistant_id) = assistant_id {
        builder = builder.with_assistant_id(assistant_id);
    }
    if let Some(limit) = recursion_limit {
        builder = builder.with_recursion_limit(limit);
    }
    builder.build()
}

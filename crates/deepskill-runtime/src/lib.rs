//! Tokio runtime for skill-aware deep agents. Glues hosted chat models, the
//! model-backed planner and the middleware stack (planning, files,
//! sub-agents, summarization, skills, shell) into [`DeepAgent`].

pub mod agent;
pub mod middleware;
pub mod planner;
pub mod prompts;
pub mod providers;
pub mod skills;

pub use agent::{
    backend_factory, create_deep_agent, create_deep_agent_from_config, get_default_model,
    AgentError, BackendContext, ConfigurableAgentBuilder, CreateDeepAgentParams, DeepAgent,
    DeepAgentConfig, RunConfig, SubAgentConfig, SummarizationConfig,
};
pub use middleware::{AgentMiddleware, ShellMiddleware};
pub use planner::LlmBackedPlanner;
pub use providers::{GeminiChatModel, GeminiConfig, OpenAiChatModel, OpenAiConfig};
pub use skills::{SkillsConfig, SkillsMiddleware};

//! Deep agent assembly and execution.
//!
//! - `api`: [`create_deep_agent`] with a parameter struct
//! - `builder`: fluent [`ConfigurableAgentBuilder`]
//! - `config`: configuration structs, run settings and backend factories
//! - `runtime`: [`DeepAgent`] and its model/tool loop

pub mod api;
pub mod builder;
pub mod config;
pub mod runtime;

#[cfg(test)]
mod runtime_tests;

pub use api::{create_deep_agent, get_default_model, CreateDeepAgentParams};
pub use builder::ConfigurableAgentBuilder;
pub use config::{
    backend_factory, BackendContext, BackendFactory, DeepAgentConfig, RunConfig, SubAgentConfig,
    SummarizationConfig, DEFAULT_RECURSION_LIMIT,
};
pub use runtime::{create_deep_agent_from_config, AgentError, DeepAgent};

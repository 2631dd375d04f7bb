//! Core traits and shared data models for skill-aware deep agents.
//! This crate stays free of HTTP, database and filesystem code so runtimes
//! and backends can compose it without pulling in heavy deps.

pub mod agent;
pub mod backend;
pub mod llm;
pub mod messaging;
pub mod persistence;
pub mod prompts;
pub mod state;
pub mod store;
pub mod tools;

pub use agent::{
    AgentDescriptor, AgentHandle, PlannerAction, PlannerContext, PlannerDecision, PlannerHandle,
};
pub use backend::{
    Backend, BackendError, BackendResult, EditResult, FileInfo, GrepMatch, WriteResult,
};
pub use llm::{LanguageModel, LlmRequest, LlmResponse, TokenUsage};
pub use messaging::{AgentMessage, MessageContent, MessageMetadata, MessageRole, ToolCall};
pub use persistence::{Checkpointer, InMemoryCheckpointer, ThreadId};
pub use state::{AgentStateSnapshot, FileData, StateDiff, TodoItem, TodoStatus};
pub use store::{InMemoryStore, Namespace, SearchQuery, Store, StoreError, StoreItem};
pub use tools::{
    Tool, ToolBox, ToolContext, ToolParameterSchema, ToolRegistry, ToolResult, ToolSchema,
};

//! Deep agent runtime: the model -> tools -> model loop, checkpointing and
//! middleware assembly.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use deepskill_core::agent::{
    AgentDescriptor, AgentHandle, PlannerAction, PlannerContext, PlannerHandle,
};
use deepskill_core::backend::Backend;
use deepskill_core::messaging::{AgentMessage, MessageContent, MessageMetadata, MessageRole, ToolCall};
use deepskill_core::persistence::{Checkpointer, ThreadId};
use deepskill_core::state::AgentStateSnapshot;
use deepskill_core::store::Store;
use deepskill_core::tools::{ToolContext, ToolRegistry, ToolResult};
use deepskill_toolkit::StateBackend;
use thiserror::Error;

use super::config::{BackendContext, DeepAgentConfig, RunConfig, SubAgentConfig};
use crate::middleware::{
    AgentMiddleware, BaseSystemPromptMiddleware, FilesystemMiddleware, MiddlewareContext,
    ModelRequest, PlanningMiddleware, SubAgentDescriptor, SubAgentMiddleware,
    SubAgentRegistration, SummarizationMiddleware,
};
use crate::prompts::GENERAL_PURPOSE_DESCRIPTION;

pub const GENERAL_PURPOSE_AGENT: &str = "general-purpose";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("recursion limit of {0} steps reached without a final response")]
    RecursionLimit(usize),
    #[error("agent state lock poisoned")]
    StatePoisoned,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A configured agent. Runs are serialized: the agent owns one live state
/// that its backend and tools share, so concurrent invocations wait.
pub struct DeepAgent {
    descriptor: AgentDescriptor,
    system_prompt: String,
    planner: Arc<dyn PlannerHandle>,
    middlewares: Vec<Arc<dyn AgentMiddleware>>,
    tools: ToolRegistry,
    state: Arc<RwLock<AgentStateSnapshot>>,
    run_lock: tokio::sync::Mutex<()>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    store: Option<Arc<dyn Store>>,
    recursion_limit: usize,
}

impl DeepAgent {
    pub fn state(&self) -> Arc<RwLock<AgentStateSnapshot>> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> Result<AgentStateSnapshot, AgentError> {
        Ok(self
            .state
            .read()
            .map_err(|_| AgentError::StatePoisoned)?
            .clone())
    }

    pub fn store(&self) -> Option<Arc<dyn Store>> {
        self.store.clone()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.names()
    }

    pub fn middleware_ids(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(|m| m.id()).collect()
    }

    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    fn update_state<R>(&self, f: impl FnOnce(&mut AgentStateSnapshot) -> R) -> Result<R, AgentError> {
        let mut state = self.state.write().map_err(|_| AgentError::StatePoisoned)?;
        Ok(f(&mut state))
    }

    fn push_message(&self, message: AgentMessage) -> Result<(), AgentError> {
        self.update_state(|s| s.messages.push(message))
    }

    /// Save the current state to the configured checkpointer.
    pub async fn save_state(&self, thread_id: &ThreadId) -> anyhow::Result<()> {
        if let Some(checkpointer) = &self.checkpointer {
            let state = self.snapshot()?;
            checkpointer.save_state(thread_id, &state).await
        } else {
            tracing::warn!("attempted to save state but no checkpointer is configured");
            Ok(())
        }
    }

    /// Load a thread's checkpoint into the live state. Returns whether one existed.
    pub async fn load_state(&self, thread_id: &ThreadId) -> anyhow::Result<bool> {
        let Some(checkpointer) = &self.checkpointer else {
            tracing::warn!("attempted to load state but no checkpointer is configured");
            return Ok(false);
        };
        match checkpointer.load_state(thread_id).await? {
            Some(saved) => {
                self.update_state(|s| *s = saved)?;
                tracing::info!(thread_id = %thread_id, "loaded agent state from checkpointer");
                Ok(true)
            }
            None => {
                tracing::debug!(thread_id = %thread_id, "no saved state found for thread");
                Ok(false)
            }
        }
    }

    pub async fn delete_thread(&self, thread_id: &ThreadId) -> anyhow::Result<()> {
        match &self.checkpointer {
            Some(checkpointer) => checkpointer.delete_thread(thread_id).await,
            None => Ok(()),
        }
    }

    pub async fn list_threads(&self) -> anyhow::Result<Vec<ThreadId>> {
        match &self.checkpointer {
            Some(checkpointer) => checkpointer.list_threads().await,
            None => Ok(Vec::new()),
        }
    }

    /// Runs one user turn on `config.thread_id` and returns the final state.
    ///
    /// The thread's checkpoint is restored first (a fresh state without one)
    /// and saved afterwards, also when the run fails part way.
    pub async fn invoke(
        &self,
        input: AgentMessage,
        config: &RunConfig,
    ) -> Result<AgentStateSnapshot, AgentError> {
        let _guard = self.run_lock.lock().await;
        let thread_id = &config.thread_id;

        let restored = match &self.checkpointer {
            Some(_) => self.load_state(thread_id).await?,
            None => false,
        };
        if !restored {
            self.update_state(|s| *s = AgentStateSnapshot::default())?;
        }

        let outcome = self.run(input).await;

        if let Some(checkpointer) = &self.checkpointer {
            let snapshot = self.snapshot()?;
            if let Err(e) = checkpointer.save_state(thread_id, &snapshot).await {
                if outcome.is_ok() {
                    return Err(e.into());
                }
                tracing::error!(thread_id = %thread_id, error = %e, "failed to checkpoint after a failed run");
            }
        }

        outcome?;
        self.snapshot()
    }

    /// Convenience wrapper around [`invoke`](Self::invoke) for a text turn.
    pub async fn invoke_text(
        &self,
        input: impl Into<String>,
        config: &RunConfig,
    ) -> Result<AgentStateSnapshot, AgentError> {
        self.invoke(AgentMessage::user(input), config).await
    }

    async fn run(&self, input: AgentMessage) -> Result<(), AgentError> {
        self.push_message(input)?;
        for middleware in &self.middlewares {
            middleware.before_agent(&self.state).await?;
        }

        let mut steps = 0usize;
        loop {
            self.step(&mut steps)?;

            let messages = self.snapshot()?.messages;
            let mut request = ModelRequest::new(self.system_prompt.clone(), messages);
            for middleware in &self.middlewares {
                let mut ctx = MiddlewareContext::with_request(&mut request, self.state.clone());
                middleware.modify_model_request(&mut ctx).await?;
            }

            let context = PlannerContext {
                history: request.messages,
                system_prompt: request.system_prompt,
                tools: self.tools.schemas(),
            };
            let decision = self
                .planner
                .plan(context, Arc::new(self.snapshot()?))
                .await?;

            match decision.next_action {
                PlannerAction::Respond { message } => {
                    self.push_message(message)?;
                    return Ok(());
                }
                PlannerAction::Terminate => return Ok(()),
                PlannerAction::CallTools { message, calls } => {
                    self.push_message(message)?;
                    self.step(&mut steps)?;
                    self.execute_tools(calls).await?;
                }
            }
        }
    }

    fn step(&self, steps: &mut usize) -> Result<(), AgentError> {
        *steps += 1;
        if *steps > self.recursion_limit {
            tracing::warn!(limit = self.recursion_limit, "recursion limit reached");
            return Err(AgentError::RecursionLimit(self.recursion_limit));
        }
        Ok(())
    }

    async fn execute_tools(&self, calls: Vec<ToolCall>) -> Result<(), AgentError> {
        let snapshot = Arc::new(self.snapshot()?);
        for call in calls {
            let message = match self.tools.get(&call.name) {
                None => {
                    tracing::warn!(tool = %call.name, "model requested an unknown tool");
                    AgentMessage::agent(format!(
                        "Error: tool '{}' is not available. Available tools: {}",
                        call.name,
                        self.tools.names().join(", ")
                    ))
                }
                Some(tool) => {
                    let ctx = ToolContext::with_mutable_state(snapshot.clone(), self.state.clone())
                        .with_call_id(Some(call.id.clone()));
                    tracing::info!(tool = %call.name, call_id = %call.id, "executing tool");
                    match tool.execute(call.args.clone(), ctx).await {
                        Ok(ToolResult::Message(message)) => message,
                        Ok(ToolResult::WithStateUpdate {
                            message,
                            state_diff,
                        }) => {
                            self.update_state(|s| s.apply_diff(state_diff))?;
                            message
                        }
                        Err(e) => {
                            tracing::warn!(tool = %call.name, error = %e, "tool failed");
                            AgentMessage::agent(format!("Error: {e}"))
                        }
                    }
                }
            };
            self.push_message(correlate(message, &call))?;
        }
        Ok(())
    }
}

/// Marks `message` as the result of `call`.
fn correlate(mut message: AgentMessage, call: &ToolCall) -> AgentMessage {
    message.role = MessageRole::Tool;
    let metadata = message.metadata.get_or_insert_with(MessageMetadata::default);
    metadata.tool_call_id = Some(call.id.clone());
    metadata.name = Some(call.name.clone());
    metadata.tool_calls.clear();
    message
}

#[async_trait]
impl AgentHandle for DeepAgent {
    async fn describe(&self) -> AgentDescriptor {
        self.descriptor.clone()
    }

    /// Runs a single ephemeral turn (no checkpoint) and returns the final
    /// agent message. Used for sub-agent delegation.
    async fn handle_message(
        &self,
        input: AgentMessage,
        _state: Arc<AgentStateSnapshot>,
    ) -> anyhow::Result<AgentMessage> {
        let _guard = self.run_lock.lock().await;
        self.update_state(|s| *s = AgentStateSnapshot::default())?;
        self.run(input).await?;
        let last = self
            .snapshot()?
            .messages
            .into_iter()
            .rev()
            .find(|m| m.role == MessageRole::Agent);
        Ok(last.unwrap_or_else(|| AgentMessage {
            role: MessageRole::Agent,
            content: MessageContent::Text(String::new()),
            metadata: None,
        }))
    }
}

fn build_subagent(parent: &DeepAgentConfig, sub: SubAgentConfig) -> SubAgentRegistration {
    let model = sub.model.unwrap_or_else(|| parent.model.clone());
    let mut config = DeepAgentConfig::new(sub.system_prompt, model);
    config.tools = sub.tools.unwrap_or_else(|| parent.tools.clone());
    config.summarization = parent.summarization.clone();
    config.backend = parent.backend.clone();
    config.store = parent.store.clone();
    config.assistant_id = parent.assistant_id.clone();
    config.recursion_limit = parent.recursion_limit;
    config.long_term_memory = parent.long_term_memory;
    config.auto_general_purpose = false;

    SubAgentRegistration {
        descriptor: SubAgentDescriptor {
            name: sub.name,
            description: sub.description,
        },
        agent: Arc::new(create_deep_agent_from_config(config)),
    }
}

/// Assembles the middleware stack in order: base prompt, planning,
/// filesystem, sub-agents, summarization, then user middleware.
pub fn create_deep_agent_from_config(mut config: DeepAgentConfig) -> DeepAgent {
    let state = Arc::new(RwLock::new(AgentStateSnapshot::default()));
    let backend: Arc<dyn Backend> = match &config.backend {
        Some(factory) => factory(&BackendContext {
            state: state.clone(),
            store: config.store.clone(),
            assistant_id: config.assistant_id.clone(),
        }),
        None => Arc::new(StateBackend::new(state.clone())),
    };

    let mut subagents = std::mem::take(&mut config.subagents);
    if config.auto_general_purpose && !subagents.iter().any(|s| s.name == GENERAL_PURPOSE_AGENT) {
        subagents.push(SubAgentConfig::new(
            GENERAL_PURPOSE_AGENT,
            GENERAL_PURPOSE_DESCRIPTION,
            config.system_prompt.clone(),
        ));
    }
    let registrations: Vec<_> = subagents
        .into_iter()
        .map(|sub| build_subagent(&config, sub))
        .collect();

    let mut middlewares: Vec<Arc<dyn AgentMiddleware>> = vec![
        Arc::new(BaseSystemPromptMiddleware),
        Arc::new(PlanningMiddleware),
        Arc::new(FilesystemMiddleware::new(backend, config.long_term_memory)),
    ];
    if !registrations.is_empty() {
        middlewares.push(Arc::new(SubAgentMiddleware::new(registrations)));
    }
    if let Some(summarization) = &config.summarization {
        let model = summarization
            .model
            .clone()
            .unwrap_or_else(|| config.model.clone());
        middlewares.push(Arc::new(SummarizationMiddleware::new(
            model,
            summarization.trigger_tokens,
            summarization.keep_messages,
        )));
    }
    middlewares.extend(config.middleware.iter().cloned());

    let mut tools = ToolRegistry::new();
    tools.register_all(config.tools.iter().cloned());
    for middleware in &middlewares {
        tools.register_all(middleware.tools());
    }

    tracing::debug!(
        assistant_id = %config.assistant_id,
        middleware = ?middlewares.iter().map(|m| m.id()).collect::<Vec<_>>(),
        tools = ?tools.names(),
        "deep agent assembled"
    );

    DeepAgent {
        descriptor: AgentDescriptor {
            name: config.assistant_id.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: None,
        },
        system_prompt: config.system_prompt,
        planner: config.planner,
        middlewares,
        tools,
        state,
        run_lock: tokio::sync::Mutex::new(()),
        checkpointer: config.checkpointer,
        store: config.store,
        recursion_limit: config.recursion_limit,
    }
}

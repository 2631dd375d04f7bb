use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use deepskill_core::backend::Backend;
use deepskill_core::messaging::AgentMessage;
use deepskill_core::prompts::{
    BASE_AGENT_PROMPT, FILESYSTEM_SYSTEM_PROMPT, LONG_TERM_MEMORY_PROMPT, WRITE_TODOS_SYSTEM_PROMPT,
};
use deepskill_core::state::AgentStateSnapshot;
use deepskill_core::tools::ToolBox;
use deepskill_toolkit::{create_filesystem_tools, create_todos_tools};

pub mod shell;
pub mod subagent;
pub mod summarization;

pub use shell::ShellMiddleware;
pub use subagent::{SubAgentDescriptor, SubAgentMiddleware, SubAgentRegistration, TaskTool};
pub use summarization::SummarizationMiddleware;

/// Request sent to the underlying language model. Middlewares can augment
/// the system prompt or rewrite the pending message list before the model call.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub messages: Vec<AgentMessage>,
}

impl ModelRequest {
    pub fn new(system_prompt: impl Into<String>, messages: Vec<AgentMessage>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages,
        }
    }

    pub fn append_prompt(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        if !self.system_prompt.is_empty() {
            self.system_prompt.push_str("\n\n");
        }
        self.system_prompt.push_str(fragment);
    }
}

/// Read/write state handle exposed to middleware implementations.
pub struct MiddlewareContext<'a> {
    pub request: &'a mut ModelRequest,
    pub state: Arc<RwLock<AgentStateSnapshot>>,
}

impl<'a> MiddlewareContext<'a> {
    pub fn with_request(
        request: &'a mut ModelRequest,
        state: Arc<RwLock<AgentStateSnapshot>>,
    ) -> Self {
        Self { request, state }
    }
}

/// Hook that contributes tools and shapes every model request.
///
/// Middlewares run in registration order: `before_agent` once per
/// invocation, `modify_model_request` before each model call.
#[async_trait]
pub trait AgentMiddleware: Send + Sync {
    /// Unique identifier for logging and diagnostics.
    fn id(&self) -> &'static str;

    /// Tools to expose when this middleware is active.
    fn tools(&self) -> Vec<ToolBox> {
        Vec::new()
    }

    async fn before_agent(&self, _state: &Arc<RwLock<AgentStateSnapshot>>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn modify_model_request(&self, ctx: &mut MiddlewareContext<'_>) -> anyhow::Result<()>;
}

pub struct BaseSystemPromptMiddleware;

#[async_trait]
impl AgentMiddleware for BaseSystemPromptMiddleware {
    fn id(&self) -> &'static str {
        "base-prompt"
    }

    async fn modify_model_request(&self, ctx: &mut MiddlewareContext<'_>) -> anyhow::Result<()> {
        ctx.request.append_prompt(BASE_AGENT_PROMPT);
        Ok(())
    }
}

/// Exposes `write_todos` / `read_todos`.
pub struct PlanningMiddleware;

#[async_trait]
impl AgentMiddleware for PlanningMiddleware {
    fn id(&self) -> &'static str {
        "planning"
    }

    fn tools(&self) -> Vec<ToolBox> {
        create_todos_tools()
    }

    async fn modify_model_request(&self, ctx: &mut MiddlewareContext<'_>) -> anyhow::Result<()> {
        ctx.request.append_prompt(WRITE_TODOS_SYSTEM_PROMPT);
        Ok(())
    }
}

/// File tools over the agent's backend.
pub struct FilesystemMiddleware {
    backend: Arc<dyn Backend>,
    long_term_memory: bool,
}

impl FilesystemMiddleware {
    /// `long_term_memory` advertises the `/memories/` route in the prompt.
    pub fn new(backend: Arc<dyn Backend>, long_term_memory: bool) -> Self {
        Self {
            backend,
            long_term_memory,
        }
    }
}

#[async_trait]
impl AgentMiddleware for FilesystemMiddleware {
    fn id(&self) -> &'static str {
        "filesystem"
    }

    fn tools(&self) -> Vec<ToolBox> {
        create_filesystem_tools(self.backend.clone())
    }

    async fn modify_model_request(&self, ctx: &mut MiddlewareContext<'_>) -> anyhow::Result<()> {
        ctx.request.append_prompt(FILESYSTEM_SYSTEM_PROMPT);
        if self.long_term_memory {
            ctx.request.append_prompt(LONG_TERM_MEMORY_PROMPT);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepskill_toolkit::StateBackend;

    fn state() -> Arc<RwLock<AgentStateSnapshot>> {
        Arc::new(RwLock::new(AgentStateSnapshot::default()))
    }

    fn tool_names(middleware: &dyn AgentMiddleware) -> Vec<String> {
        middleware.tools().iter().map(|t| t.schema().name).collect()
    }

    struct AppendPromptMiddleware;

    #[async_trait]
    impl AgentMiddleware for AppendPromptMiddleware {
        fn id(&self) -> &'static str {
            "append-prompt"
        }

        async fn modify_model_request(
            &self,
            ctx: &mut MiddlewareContext<'_>,
        ) -> anyhow::Result<()> {
            ctx.request.append_prompt("Extra directives.");
            Ok(())
        }
    }

    #[tokio::test]
    async fn middleware_mutates_prompt() {
        let mut request = ModelRequest::new("System", vec![AgentMessage::user("Hi")]);
        let mut ctx = MiddlewareContext::with_request(&mut request, state());
        AppendPromptMiddleware
            .modify_model_request(&mut ctx)
            .await
            .unwrap();
        assert_eq!(request.system_prompt, "System\n\nExtra directives.");
    }

    #[test]
    fn append_prompt_skips_separator_for_empty_prompt() {
        let mut request = ModelRequest::new("", vec![]);
        request.append_prompt("First");
        request.append_prompt("");
        assert_eq!(request.system_prompt, "First");
    }

    #[tokio::test]
    async fn planning_middleware_registers_todo_tools() {
        let middleware = PlanningMiddleware;
        let names = tool_names(&middleware);
        assert!(names.contains(&"write_todos".to_string()));
        assert!(names.contains(&"read_todos".to_string()));

        let mut request = ModelRequest::new("System", vec![]);
        let mut ctx = MiddlewareContext::with_request(&mut request, state());
        middleware.modify_model_request(&mut ctx).await.unwrap();
        assert!(request.system_prompt.contains("write_todos"));
    }

    #[tokio::test]
    async fn filesystem_middleware_exposes_backend_tools_and_memory_prompt() {
        let backend = Arc::new(StateBackend::new(state()));
        let middleware = FilesystemMiddleware::new(backend, true);
        let names = tool_names(&middleware);
        for expected in ["ls", "read_file", "write_file", "edit_file", "glob", "grep"] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }

        let mut request = ModelRequest::new("System", vec![]);
        let mut ctx = MiddlewareContext::with_request(&mut request, state());
        middleware.modify_model_request(&mut ctx).await.unwrap();
        assert!(request.system_prompt.contains("/memories/"));
    }
}

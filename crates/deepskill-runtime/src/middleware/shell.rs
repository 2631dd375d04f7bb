//! Shell middleware: exposes the `shell` tool and tells the model where it runs.

use std::sync::Arc;

use async_trait::async_trait;
use deepskill_core::tools::ToolBox;
use deepskill_toolkit::{ShellConfig, ShellTool};

use crate::middleware::{AgentMiddleware, MiddlewareContext};
use crate::prompts::SHELL_SYSTEM_PROMPT;

pub struct ShellMiddleware {
    tool: Arc<ShellTool>,
}

impl ShellMiddleware {
    pub fn new(config: ShellConfig) -> Self {
        tracing::info!(
            workspace_root = %config.workspace_root.display(),
            timeout_secs = config.timeout.as_secs_f64(),
            max_output_bytes = config.max_output_bytes,
            "shell middleware configured"
        );
        Self {
            tool: Arc::new(ShellTool::new(config)),
        }
    }

    pub fn config(&self) -> &ShellConfig {
        self.tool.config()
    }
}

#[async_trait]
impl AgentMiddleware for ShellMiddleware {
    fn id(&self) -> &'static str {
        "shell"
    }

    fn tools(&self) -> Vec<ToolBox> {
        vec![self.tool.clone()]
    }

    async fn modify_model_request(&self, ctx: &mut MiddlewareContext<'_>) -> anyhow::Result<()> {
        let root = self.config().workspace_root.display().to_string();
        ctx.request
            .append_prompt(&SHELL_SYSTEM_PROMPT.replace("{workspace_root}", &root));
        Ok(())
    }
}

//! `shell` tool: runs a command with `sh -c` inside the workspace root.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use deepskill_core::tools::{Tool, ToolContext, ToolParameterSchema, ToolResult, ToolSchema};
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;

pub const DEFAULT_SHELL_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 100_000;

#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub workspace_root: PathBuf,
    pub timeout: Duration,
    pub max_output_bytes: usize,
    /// Extra environment variables for every command.
    pub env: BTreeMap<String, String>,
}

impl ShellConfig {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            timeout: DEFAULT_SHELL_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            env: BTreeMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

pub struct ShellTool {
    config: ShellConfig,
}

impl ShellTool {
    pub fn new(config: ShellConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Runs `command` and renders the output the way the model sees it.
    pub async fn run(&self, command: &str) -> anyhow::Result<String> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.config.workspace_root)
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!(command = %command, cwd = %self.config.workspace_root.display(), "running shell command");
        let child = cmd.spawn()?;
        let output = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                tracing::warn!(command = %command, timeout_secs = self.config.timeout.as_secs_f64(), "shell command timed out");
                return Ok(format!(
                    "Error: Command timed out after {} seconds.",
                    self.config.timeout.as_secs_f64()
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(format_output(
            &stdout,
            &stderr,
            output.status.code(),
            self.config.max_output_bytes,
        ))
    }
}

/// Combines stdout and `[stderr] `-prefixed stderr, truncates, and appends
/// the exit code when it is non-zero.
pub fn format_output(stdout: &str, stderr: &str, code: Option<i32>, max_bytes: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !stdout.is_empty() {
        parts.push(stdout.to_string());
    }
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        parts.extend(stderr.lines().map(|line| format!("[stderr] {line}")));
    }
    let mut output = if parts.is_empty() {
        "<no output>".to_string()
    } else {
        parts.join("\n")
    };

    if output.len() > max_bytes {
        let mut cut = max_bytes;
        while !output.is_char_boundary(cut) {
            cut -= 1;
        }
        output.truncate(cut);
        output.push_str(&format!("\n\n... Output truncated at {max_bytes} bytes."));
    }

    match code {
        Some(0) => {}
        Some(code) => output.push_str(&format!("\n\nExit code: {code}")),
        // Killed by a signal.
        None => output.push_str("\n\nExit code: signal"),
    }
    output
}

#[derive(Deserialize)]
struct ShellArgs {
    command: String,
}

#[async_trait]
impl Tool for ShellTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "shell",
            format!(
                "Execute a shell command in the workspace directory ({}). Returns stdout, stderr prefixed with [stderr], and the exit code when non-zero.",
                self.config.workspace_root.display()
            ),
            ToolParameterSchema::object(
                [("command", ToolParameterSchema::string("The shell command to execute"))],
                &["command"],
            ),
        )
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> anyhow::Result<ToolResult> {
        let args: ShellArgs = serde_json::from_value(args)?;
        let text = match self.run(&args.command).await {
            Ok(text) => text,
            Err(e) => format!("Error executing command: {e}"),
        };
        Ok(ToolResult::text(&ctx, text))
    }
}

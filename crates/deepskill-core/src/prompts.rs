//! Prompt fragments shared by the default middleware stack.

pub const BASE_AGENT_PROMPT: &str = r#"In order to complete the objective that the user asks of you, you have access to a number of standard tools.

General expectations:
- Prefer calling tools over guessing; never describe a tool call instead of making it.
- Keep updates short and high-signal.
- Verify your work before concluding, then summarize what changed."#;

pub const WRITE_TODOS_SYSTEM_PROMPT: &str = r#"## `write_todos`

You have access to the `write_todos` tool to help you manage and plan complex objectives.
Use it for multi-step tasks so the user can follow your progress.
- Mark a task in_progress before starting it.
- Mark tasks completed as soon as they are done; do not batch completions.
- Skip the todo list for trivial, single-step requests."#;

pub const FILESYSTEM_SYSTEM_PROMPT: &str = r#"## Filesystem Tools `ls`, `read_file`, `write_file`, `edit_file`, `glob`, `grep`

You have access to a filesystem which you can interact with using these tools.
All file paths must start with a /.

- ls: list files in a directory (requires absolute path)
- read_file: read a file from the filesystem
- write_file: write to a new file in the filesystem
- edit_file: edit a file in the filesystem
- glob: find files matching a pattern (e.g., "**/*.py")
- grep: search for text within files"#;

pub const LONG_TERM_MEMORY_PROMPT: &str = r#"## Long-term Memory

Files under `/memories/` are persisted across conversations.
Save durable facts, user preferences and reusable notes there; everything else is scoped to the current workspace."#;

pub const TASK_SYSTEM_PROMPT: &str = r#"## `task` (subagent spawner)

You have access to a `task` tool to launch short-lived subagents that handle isolated tasks.
- Provide a complete, self-contained description; the subagent does not see this conversation.
- Launch independent subagents in parallel when possible.
- The subagent's final message is returned to you; summarize it for the user."#;

pub const TASK_TOOL_DESCRIPTION: &str = r#"Launch an ephemeral subagent to handle a complex, multi-step independent task with an isolated context window.

Available agent types and the tools they have access to:
{other_agents}

When using the task tool, you must specify a subagent_type parameter to select which agent type to use."#;

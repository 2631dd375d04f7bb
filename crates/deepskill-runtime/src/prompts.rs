//! Prompt sections appended by the runtime's middleware.
//!
//! Placeholders in braces are substituted with `str::replace` so the
//! templates can be read as plain markdown.

/// Appended by the skills middleware. `{skills_locations}` and
/// `{skills_list}` are filled from the current catalog.
pub const SKILLS_SYSTEM_PROMPT: &str = r#"## Skills System

You have access to a skills library that provides specialized capabilities and domain knowledge.

{skills_locations}

**Available Skills:**

{skills_list}

**How to Use Skills (Progressive Disclosure):**

Skills follow a progressive disclosure pattern: you know they exist (name + description above), but you only read the full instructions when needed.

1. **Recognize when a skill applies**: check whether the user's task matches any skill's description.
2. **Read the skill's full instructions**: call `load_skill` with the skill name, or use `read_file` on the path shown above.
3. **Follow the skill's instructions**: SKILL.md contains step-by-step workflows, best practices and examples.
4. **Access supporting files**: skills may include helper scripts, configs or reference docs next to SKILL.md; use absolute paths.

**When to Use Skills:**
- The user's request matches a skill's domain (e.g. "edit this docx" -> docx skill)
- You need specialized knowledge or structured workflows
- A skill provides proven patterns for complex tasks

**Executing Skill Scripts:**
Skills may contain Python scripts or other executables. Run them with the `shell` tool using the absolute paths from the skill list."#;

/// Appended by the shell middleware. `{workspace_root}` is the working directory.
pub const SHELL_SYSTEM_PROMPT: &str = r#"## Shell Tool `shell`

You can run shell commands with the `shell` tool.
- Commands run through `sh -c` in the working directory `{workspace_root}`.
- stdout and stderr are captured; stderr lines are prefixed with `[stderr]`.
- Long-running commands are killed after the configured timeout.
- Prefer absolute paths and avoid interactive commands.
- Never use `sudo`. If a command fails because of permissions, stop and report it."#;

/// Instruction given to the model when older history is condensed.
pub const SUMMARY_PROMPT: &str = r#"<role>
Context Extraction Assistant
</role>

<primary_objective>
Extract the most relevant context from the conversation history below so the conversation can continue with a shorter history.
</primary_objective>

<instructions>
The conversation below will be replaced with the summary you write. Keep:
- the user's goals and constraints,
- decisions made and their outcomes,
- file paths, identifiers and values that later steps depend on,
- work still pending.
Respond only with the summary, without preamble.
</instructions>

<messages>
{messages}
</messages>"#;

/// Prefix of the synthetic message that replaces summarized history.
pub const SUMMARY_MESSAGE_PREFIX: &str = "Here is a summary of the conversation to date:";

pub const GENERAL_PURPOSE_DESCRIPTION: &str = "General-purpose agent for researching complex questions, searching for files and content, and executing multi-step tasks. It has access to the same tools as the main agent.";

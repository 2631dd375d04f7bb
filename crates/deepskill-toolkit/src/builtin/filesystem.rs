//! File tools (`ls`, `read_file`, `write_file`, `edit_file`, `glob`, `grep`)
//! backed by a [`Backend`]. Backend failures are reported to the model as
//! `Error: ...` text rather than aborting the run.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use deepskill_core::backend::{Backend, GrepMatch};
use deepskill_core::tools::{Tool, ToolBox, ToolContext, ToolParameterSchema, ToolResult, ToolSchema};
use serde::Deserialize;
use serde_json::{json, Value};

pub const DEFAULT_READ_LIMIT: usize = 2000;

fn error_text(ctx: &ToolContext, err: impl std::fmt::Display) -> ToolResult {
    ToolResult::text(ctx, format!("Error: {err}"))
}

fn default_root() -> String {
    "/".to_string()
}

/// Lists entries under a directory
pub struct LsTool {
    backend: Arc<dyn Backend>,
}

impl LsTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[derive(Deserialize)]
struct LsArgs {
    #[serde(default = "default_root")]
    path: String,
}

#[async_trait]
impl Tool for LsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "ls",
            "List files and directories under an absolute path",
            ToolParameterSchema::object(
                [(
                    "path",
                    ToolParameterSchema::string("Absolute directory path (default: /)")
                        .with_default(json!("/")),
                )],
                &[],
            ),
        )
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> anyhow::Result<ToolResult> {
        let args: LsArgs = serde_json::from_value(args)?;
        match self.backend.ls_info(&args.path).await {
            Ok(infos) => {
                let paths: Vec<String> = infos.into_iter().map(|i| i.path).collect();
                Ok(ToolResult::json(&ctx, json!(paths)))
            }
            Err(e) => Ok(error_text(&ctx, e)),
        }
    }
}

pub struct ReadFileTool {
    backend: Arc<dyn Backend>,
}

impl ReadFileTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[derive(Deserialize)]
struct ReadFileArgs {
    file_path: String,
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

const fn default_limit() -> usize {
    DEFAULT_READ_LIMIT
}

#[async_trait]
impl Tool for ReadFileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "read_file",
            "Read a file with line numbers, optionally starting at a line offset",
            ToolParameterSchema::object(
                [
                    ("file_path", ToolParameterSchema::string("Absolute path of the file")),
                    (
                        "offset",
                        ToolParameterSchema::integer("Line number to start reading from (default: 0)"),
                    ),
                    (
                        "limit",
                        ToolParameterSchema::integer("Maximum number of lines to read (default: 2000)"),
                    ),
                ],
                &["file_path"],
            ),
        )
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> anyhow::Result<ToolResult> {
        let args: ReadFileArgs = serde_json::from_value(args)?;
        match self.backend.read(&args.file_path, args.offset, args.limit).await {
            Ok(text) => Ok(ToolResult::text(&ctx, text)),
            Err(e) => Ok(error_text(&ctx, e)),
        }
    }
}

pub struct WriteFileTool {
    backend: Arc<dyn Backend>,
}

impl WriteFileTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[derive(Deserialize)]
struct WriteFileArgs {
    file_path: String,
    content: String,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "write_file",
            "Create a new file. Fails if the file already exists; use edit_file to change it.",
            ToolParameterSchema::object(
                [
                    ("file_path", ToolParameterSchema::string("Absolute path of the new file")),
                    ("content", ToolParameterSchema::string("Content to write")),
                ],
                &["file_path", "content"],
            ),
        )
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> anyhow::Result<ToolResult> {
        let args: WriteFileArgs = serde_json::from_value(args)?;
        match self.backend.write(&args.file_path, &args.content).await {
            Ok(result) => Ok(ToolResult::text(&ctx, format!("Updated file {}", result.path))),
            Err(e) => Ok(error_text(&ctx, e)),
        }
    }
}

pub struct EditFileTool {
    backend: Arc<dyn Backend>,
}

impl EditFileTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[derive(Deserialize)]
struct EditFileArgs {
    file_path: String,
    old_string: String,
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

#[async_trait]
impl Tool for EditFileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "edit_file",
            "Edit a file by replacing old_string with new_string",
            ToolParameterSchema::object(
                [
                    ("file_path", ToolParameterSchema::string("Absolute path of the file")),
                    ("old_string", ToolParameterSchema::string("Exact text to replace")),
                    ("new_string", ToolParameterSchema::string("Replacement text")),
                    (
                        "replace_all",
                        ToolParameterSchema::boolean(
                            "Replace all occurrences (default: false, requires unique match)",
                        ),
                    ),
                ],
                &["file_path", "old_string", "new_string"],
            ),
        )
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> anyhow::Result<ToolResult> {
        let args: EditFileArgs = serde_json::from_value(args)?;
        let result = self
            .backend
            .edit(&args.file_path, &args.old_string, &args.new_string, args.replace_all)
            .await;
        match result {
            Ok(edit) if args.replace_all => Ok(ToolResult::text(
                &ctx,
                format!(
                    "Successfully replaced {} instance(s) of the string in '{}'",
                    edit.occurrences, edit.path
                ),
            )),
            Ok(edit) => Ok(ToolResult::text(
                &ctx,
                format!("Successfully replaced string in '{}'", edit.path),
            )),
            Err(e) => Ok(error_text(&ctx, e)),
        }
    }
}

pub struct GlobTool {
    backend: Arc<dyn Backend>,
}

impl GlobTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[derive(Deserialize)]
struct GlobArgs {
    pattern: String,
    #[serde(default = "default_root")]
    path: String,
}

#[async_trait]
impl Tool for GlobTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "glob",
            "Find files matching a glob pattern such as **/*.md",
            ToolParameterSchema::object(
                [
                    ("pattern", ToolParameterSchema::string("Glob pattern")),
                    (
                        "path",
                        ToolParameterSchema::string("Directory to search from (default: /)")
                            .with_default(json!("/")),
                    ),
                ],
                &["pattern"],
            ),
        )
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> anyhow::Result<ToolResult> {
        let args: GlobArgs = serde_json::from_value(args)?;
        match self.backend.glob_info(&args.pattern, &args.path).await {
            Ok(infos) => {
                let paths: Vec<String> = infos.into_iter().map(|i| i.path).collect();
                Ok(ToolResult::json(&ctx, json!(paths)))
            }
            Err(e) => Ok(error_text(&ctx, e)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GrepOutputMode {
    #[default]
    FilesWithMatches,
    Content,
    Count,
}

pub struct GrepTool {
    backend: Arc<dyn Backend>,
}

impl GrepTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[derive(Deserialize)]
struct GrepArgs {
    pattern: String,
    #[serde(default = "default_root")]
    path: String,
    #[serde(default)]
    glob: Option<String>,
    #[serde(default)]
    output_mode: GrepOutputMode,
}

/// Renders grep hits for the model.
pub fn format_grep(matches: &[GrepMatch], mode: GrepOutputMode) -> String {
    if matches.is_empty() {
        return "No matches found".to_string();
    }
    match mode {
        GrepOutputMode::FilesWithMatches => {
            let mut files: Vec<&str> = matches.iter().map(|m| m.path.as_str()).collect();
            files.dedup();
            files.join("\n")
        }
        GrepOutputMode::Content => {
            let mut grouped: BTreeMap<&str, Vec<&GrepMatch>> = BTreeMap::new();
            for m in matches {
                grouped.entry(m.path.as_str()).or_default().push(m);
            }
            grouped
                .into_iter()
                .map(|(path, hits)| {
                    let lines: Vec<String> = hits
                        .iter()
                        .map(|m| format!("  {}: {}", m.line, m.text))
                        .collect();
                    format!("{path}:\n{}", lines.join("\n"))
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        GrepOutputMode::Count => {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for m in matches {
                *counts.entry(m.path.as_str()).or_default() += 1;
            }
            counts
                .into_iter()
                .map(|(path, n)| format!("{path}: {n}"))
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "grep",
            "Search file contents with a regular expression",
            ToolParameterSchema::object(
                [
                    ("pattern", ToolParameterSchema::string("Regular expression to search for")),
                    (
                        "path",
                        ToolParameterSchema::string("Directory to search in (default: /)")
                            .with_default(json!("/")),
                    ),
                    (
                        "glob",
                        ToolParameterSchema::string("Only search files whose name matches this glob"),
                    ),
                    (
                        "output_mode",
                        ToolParameterSchema::string_enum(
                            "files_with_matches (default), content or count",
                            ["files_with_matches", "content", "count"],
                        ),
                    ),
                ],
                &["pattern"],
            ),
        )
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> anyhow::Result<ToolResult> {
        let args: GrepArgs = serde_json::from_value(args)?;
        match self
            .backend
            .grep_raw(&args.pattern, &args.path, args.glob.as_deref())
            .await
        {
            Ok(matches) => Ok(ToolResult::text(&ctx, format_grep(&matches, args.output_mode))),
            Err(e) => Ok(error_text(&ctx, e)),
        }
    }
}

/// All six file tools sharing one backend.
pub fn create_filesystem_tools(backend: Arc<dyn Backend>) -> Vec<ToolBox> {
    vec![
        Arc::new(LsTool::new(backend.clone())),
        Arc::new(ReadFileTool::new(backend.clone())),
        Arc::new(WriteFileTool::new(backend.clone())),
        Arc::new(EditFileTool::new(backend.clone())),
        Arc::new(GlobTool::new(backend.clone())),
        Arc::new(GrepTool::new(backend)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::StateBackend;
    use deepskill_core::state::AgentStateSnapshot;
    use std::sync::RwLock;

    fn setup() -> (Arc<dyn Backend>, ToolContext) {
        let state = Arc::new(RwLock::new(AgentStateSnapshot::default()));
        let backend: Arc<dyn Backend> = Arc::new(StateBackend::new(state));
        let ctx = ToolContext::new(Arc::new(AgentStateSnapshot::default()));
        (backend, ctx)
    }

    fn text(result: ToolResult) -> String {
        result.message().content.to_text()
    }

    #[tokio::test]
    async fn write_then_read_through_tools() {
        let (backend, ctx) = setup();
        let write = WriteFileTool::new(backend.clone());
        let out = write
            .execute(json!({"file_path": "/a.md", "content": "hello\nworld"}), ctx.clone())
            .await
            .unwrap();
        assert_eq!(text(out), "Updated file /a.md");

        let again = write
            .execute(json!({"file_path": "/a.md", "content": "x"}), ctx.clone())
            .await
            .unwrap();
        assert!(text(again).starts_with("Error: cannot write to /a.md"));

        let read = ReadFileTool::new(backend)
            .execute(json!({"file_path": "/a.md", "offset": 1}), ctx)
            .await
            .unwrap();
        assert_eq!(text(read), "     2\tworld");
    }

    #[tokio::test]
    async fn edit_reports_ambiguous_matches() {
        let (backend, ctx) = setup();
        backend.write("/a.md", "x x").await.unwrap();
        let edit = EditFileTool::new(backend);
        let out = edit
            .execute(
                json!({"file_path": "/a.md", "old_string": "x", "new_string": "y"}),
                ctx.clone(),
            )
            .await
            .unwrap();
        assert!(text(out).contains("appears 2 times"));

        let out = edit
            .execute(
                json!({"file_path": "/a.md", "old_string": "x", "new_string": "y", "replace_all": true}),
                ctx,
            )
            .await
            .unwrap();
        assert_eq!(text(out), "Successfully replaced 2 instance(s) of the string in '/a.md'");
    }

    #[tokio::test]
    async fn ls_glob_and_grep_modes() {
        let (backend, ctx) = setup();
        backend.write("/docs/a.md", "alpha\nbeta alpha").await.unwrap();
        backend.write("/b.txt", "alpha").await.unwrap();

        let ls = LsTool::new(backend.clone())
            .execute(json!({}), ctx.clone())
            .await
            .unwrap();
        assert_eq!(ls.message().content.as_json(), Some(&json!(["/b.txt", "/docs/"])));

        let glob = GlobTool::new(backend.clone())
            .execute(json!({"pattern": "**/*.md"}), ctx.clone())
            .await
            .unwrap();
        assert_eq!(glob.message().content.as_json(), Some(&json!(["/docs/a.md"])));

        let grep = GrepTool::new(backend.clone());
        let files = grep
            .execute(json!({"pattern": "alpha"}), ctx.clone())
            .await
            .unwrap();
        assert_eq!(text(files), "/b.txt\n/docs/a.md");

        let count = grep
            .execute(json!({"pattern": "alpha", "output_mode": "count"}), ctx.clone())
            .await
            .unwrap();
        assert_eq!(text(count), "/b.txt: 1\n/docs/a.md: 2");

        let content = grep
            .execute(json!({"pattern": "beta", "output_mode": "content"}), ctx)
            .await
            .unwrap();
        assert_eq!(text(content), "/docs/a.md:\n  2: beta alpha");
    }

    #[test]
    fn factory_builds_six_tools() {
        let (backend, _) = setup();
        let names: Vec<_> = create_filesystem_tools(backend)
            .iter()
            .map(|t| t.schema().name)
            .collect();
        assert_eq!(names, vec!["ls", "read_file", "write_file", "edit_file", "glob", "grep"]);
    }
}

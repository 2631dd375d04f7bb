use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::anyhow;
use async_trait::async_trait;
use deepskill_core::state::AgentStateSnapshot;
use deepskill_core::tools::{Tool, ToolBox, ToolContext, ToolParameterSchema, ToolResult, ToolSchema};
use serde::Deserialize;
use serde_json::Value;

use super::loader::{list_skills, load_skill_content, SkillCatalog, SkillSource};
use crate::middleware::{AgentMiddleware, MiddlewareContext};
use crate::prompts::SKILLS_SYSTEM_PROMPT;

#[derive(Debug, Clone)]
pub struct SkillsConfig {
    /// User-level skills directory.
    pub skills_dir: PathBuf,
    pub assistant_id: String,
    /// Project-level skills; these override user skills with the same name.
    pub project_skills_dir: Option<PathBuf>,
}

impl SkillsConfig {
    pub fn new(skills_dir: impl Into<PathBuf>, assistant_id: impl Into<String>) -> Self {
        Self {
            skills_dir: skills_dir.into(),
            assistant_id: assistant_id.into(),
            project_skills_dir: None,
        }
    }

    pub fn with_project_skills_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.project_skills_dir = dir;
        self
    }
}

type SharedCatalog = Arc<RwLock<SkillCatalog>>;

fn read_catalog(catalog: &SharedCatalog) -> anyhow::Result<SkillCatalog> {
    Ok(catalog
        .read()
        .map_err(|_| anyhow!("skills catalog lock poisoned"))?
        .clone())
}

/// Advertises installed skills in the system prompt and loads their
/// instructions on request.
pub struct SkillsMiddleware {
    config: SkillsConfig,
    catalog: SharedCatalog,
    load_tool: Arc<LoadSkillTool>,
}

impl SkillsMiddleware {
    pub fn new(config: SkillsConfig) -> Self {
        tracing::info!(
            assistant_id = %config.assistant_id,
            skills_dir = %config.skills_dir.display(),
            project_skills_dir = ?config.project_skills_dir,
            "skills middleware configured"
        );
        let catalog: SharedCatalog = Arc::default();
        Self {
            config,
            load_tool: Arc::new(LoadSkillTool {
                catalog: catalog.clone(),
            }),
            catalog,
        }
    }

    pub fn config(&self) -> &SkillsConfig {
        &self.config
    }

    pub fn catalog(&self) -> anyhow::Result<SkillCatalog> {
        read_catalog(&self.catalog)
    }

    /// Rescans both skill directories and replaces the cached catalog.
    pub async fn refresh(&self) -> anyhow::Result<SkillCatalog> {
        let user_dir = self.config.skills_dir.clone();
        let project_dir = self.config.project_skills_dir.clone();
        let catalog = tokio::task::spawn_blocking(move || {
            list_skills(Some(user_dir.as_path()), project_dir.as_deref())
        })
        .await?;
        tracing::debug!(skills = catalog.len(), "skills catalog refreshed");
        *self
            .catalog
            .write()
            .map_err(|_| anyhow!("skills catalog lock poisoned"))? = catalog.clone();
        Ok(catalog)
    }

    fn locations(&self) -> String {
        let user = self.config.skills_dir.display();
        match &self.config.project_skills_dir {
            Some(project) => format!(
                "**Skills Locations**: Skills are stored in two locations:\n\
                 - **User Skills**: `{user}`\n\
                 - **Project Skills**: `{}` (overrides user skills)",
                project.display()
            ),
            None => format!("**Skills Location**: `{user}`"),
        }
    }

    fn listing(&self, catalog: &SkillCatalog) -> String {
        if catalog.is_empty() {
            let mut dirs = vec![format!("`{}`", self.config.skills_dir.display())];
            if let Some(project) = &self.config.project_skills_dir {
                dirs.push(format!("`{}`", project.display()));
            }
            return format!(
                "(No skills available yet. You can create skills in {} as `<skill-name>/SKILL.md`)",
                dirs.join(" or ")
            );
        }

        let mut sections = Vec::new();
        for source in [SkillSource::User, SkillSource::Project] {
            let skills = catalog.by_source(source);
            if skills.is_empty() {
                continue;
            }
            let mut lines = vec![format!("**{} Skills:**", source.label())];
            for skill in skills {
                lines.push(format!("- **{}**: {}", skill.name, skill.description));
                lines.push(format!("  -> Read `{}` for full instructions", skill.path.display()));
            }
            sections.push(lines.join("\n"));
        }
        sections.join("\n\n")
    }

    pub fn prompt_section(&self, catalog: &SkillCatalog) -> String {
        SKILLS_SYSTEM_PROMPT
            .replace("{skills_locations}", &self.locations())
            .replace("{skills_list}", &self.listing(catalog))
    }
}

#[async_trait]
impl AgentMiddleware for SkillsMiddleware {
    fn id(&self) -> &'static str {
        "skills"
    }

    fn tools(&self) -> Vec<ToolBox> {
        vec![self.load_tool.clone()]
    }

    async fn before_agent(&self, _state: &Arc<RwLock<AgentStateSnapshot>>) -> anyhow::Result<()> {
        self.refresh().await.map(|_| ())
    }

    async fn modify_model_request(&self, ctx: &mut MiddlewareContext<'_>) -> anyhow::Result<()> {
        let catalog = read_catalog(&self.catalog)?;
        ctx.request.append_prompt(&self.prompt_section(&catalog));
        Ok(())
    }
}

/// `load_skill`: returns the full instructions of a catalogued skill.
pub struct LoadSkillTool {
    catalog: SharedCatalog,
}

#[derive(Debug, Deserialize)]
struct LoadSkillArgs {
    name: String,
}

fn skill_dir_display(path: &Path) -> String {
    path.parent().unwrap_or(path).display().to_string()
}

#[async_trait]
impl Tool for LoadSkillTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "load_skill",
            "Load the full instructions of an installed skill by name",
            ToolParameterSchema::object(
                [("name", ToolParameterSchema::string("Skill name from the skills list"))],
                &["name"],
            ),
        )
    }

    async fn execute(&self, args: Value, ctx: ToolContext) -> anyhow::Result<ToolResult> {
        let args: LoadSkillArgs = serde_json::from_value(args)?;
        let catalog = read_catalog(&self.catalog)?;
        let Some(metadata) = catalog.get(&args.name).cloned() else {
            let available = if catalog.is_empty() {
                "none".to_string()
            } else {
                catalog.names().join(", ")
            };
            return Ok(ToolResult::text(
                &ctx,
                format!("Error: skill '{}' not found. Available skills: {available}", args.name),
            ));
        };

        let content = match tokio::task::spawn_blocking(move || load_skill_content(&metadata)).await? {
            Ok(content) => content,
            Err(e) => return Ok(ToolResult::text(&ctx, format!("Error: {e}"))),
        };
        tracing::info!(skill = %content.metadata.name, "skill loaded");

        let mut text = format!("# Skill: {}\n\n{}", content.metadata.name, content.body);
        text.push_str(&format!(
            "\n\nSkill directory: {}",
            skill_dir_display(&content.metadata.path)
        ));
        if !content.metadata.allowed_tools.is_empty() {
            text.push_str(&format!(
                "\nAllowed tools: {}",
                content.metadata.allowed_tools.join(", ")
            ));
        }
        Ok(ToolResult::text(&ctx, text))
    }
}

//! Agent profiles: prompt, model, backend routing, middleware and persistence
//! for each kind of run the launcher supports.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use deepskill_core::llm::LanguageModel;
use deepskill_core::store::InMemoryStore;
use deepskill_core::tools::ToolBox;
use deepskill_persistence::{load_store_snapshot, SqliteCheckpointer};
use deepskill_runtime::agent::{backend_factory, BackendFactory};
use deepskill_runtime::{
    ConfigurableAgentBuilder, DeepAgent, GeminiChatModel, GeminiConfig, OpenAiChatModel,
    OpenAiConfig, ShellMiddleware, SkillsConfig, SkillsMiddleware, SubAgentConfig,
    SummarizationConfig,
};
use deepskill_toolkit::{
    CompositeBackend, FetchUrlTool, FilesystemBackend, ShellConfig, StoreBackend, TavilyConfig,
    TavilySearchTool,
};

use crate::cli::{Cli, Profile, Provider};

pub const ASSISTANT_ID: &str = "agent";
pub const MODEL_TEMPERATURE: f32 = 0.2;
pub const MODEL_MAX_RETRIES: u32 = 3;
pub const SUMMARY_TRIGGER_TOKENS: usize = 5000;
pub const SUMMARY_KEEP_MESSAGES: usize = 4;

const DOCS_SYSTEM_PROMPT: &str = "你是拥有多种文档处理技能的智能体，能够帮助用户完成各种类型的文档创建、分析和编辑任务。

## 工作流程
1. 理解用户需求。
2. 首先考虑已安装的技能来满足需求，并根据需要调用工具。如：处理docx文档，可以加载docx技能（docx skills）
3. 如果没有合适的技能，考虑直接使用工具来完成任务。

## 输出要求
- 使用中文输出

## 严格遵循
- 当前工作目录 (CWD): {workspace_root}
- 凡是生成与写入的文件，默认必须放在 ./fs/ 目录下。
- 如果使用 shell 工具解压文件，请使用绝对路径或明确的相对路径。
- 读取文件时，请使用绝对路径（如 {workspace_root}/my_file.txt）以避免路径错误。
- **严禁使用 sudo 命令**。如果遇到权限问题，请停止并报告。";

const RESEARCH_SYSTEM_PROMPT: &str = "你是拥有多种技能的智能体，能够帮助用户完成各种任务。

## 工作流程
1. 理解用户需求。
2. 首先考虑已安装的技能来满足需求，并根据需要调用工具。
3. 如果没有合适的技能，考虑直接使用工具来完成任务。

## 输出要求
- 使用中文输出

## 严格遵循
- 凡是生成与写入的文件，默认必须放在/fs/ 目录下";

const SEARCH_AGENT_NAME: &str = "search-agent";
const SEARCH_AGENT_DESCRIPTION: &str = "使用search工具进行信息检索与总结的智能体";
const SEARCH_AGENT_PROMPT: &str = "你是web检索与研究智能体。";

impl Profile {
    pub fn system_prompt(self, workspace: &Path) -> String {
        match self {
            Profile::Docs => {
                DOCS_SYSTEM_PROMPT.replace("{workspace_root}", &workspace.display().to_string())
            }
            Profile::Research => RESEARCH_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn default_query(self) -> &'static str {
        match self {
            Profile::Docs => "列出已安装的技能，并说明每个技能适合处理哪类文档。",
            Profile::Research => "分析贵州茅台 600519",
        }
    }

    /// Document runs keep skills inside the workspace; research runs share the
    /// per-user directory under `~/.deepagents`.
    pub fn default_skills_dir(self, workspace: &Path) -> PathBuf {
        let base = match self {
            Profile::Docs => workspace.to_path_buf(),
            Profile::Research => dirs::home_dir()
                .unwrap_or_else(|| workspace.to_path_buf())
                .join(".deepagents"),
        };
        base.join(ASSISTANT_ID).join("skills")
    }

    /// Whether runs are checkpointed and leave a trajectory and store snapshot behind.
    pub fn is_durable(self) -> bool {
        matches!(self, Profile::Docs)
    }
}

impl Provider {
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Openai => "gpt-4o-mini",
            Provider::Dashscope => "deepseek-v3",
            Provider::Gemini => "gemini-2.5-flash",
        }
    }
}

/// Where a durable run keeps its data, relative to the workspace.
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub workspace: PathBuf,
    pub checkpoint_db: PathBuf,
    pub store_file: PathBuf,
    pub trajectories: PathBuf,
}

impl DataLayout {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        Self {
            checkpoint_db: workspace.join("checkpoints.sqlite"),
            store_file: workspace.join("store_memories.json"),
            trajectories: workspace.join("trajectories"),
            workspace,
        }
    }

    pub fn files_dir(&self) -> PathBuf {
        self.workspace.join("fs")
    }
}

fn require(key: &Option<String>, var: &str, provider: Provider) -> anyhow::Result<String> {
    key.clone()
        .filter(|k| !k.trim().is_empty())
        .with_context(|| format!("{var} environment variable is required for the {provider:?} provider"))
}

pub fn build_model(cli: &Cli) -> anyhow::Result<Arc<dyn LanguageModel>> {
    let provider = cli.provider();
    let model_name = cli
        .model
        .clone()
        .unwrap_or_else(|| provider.default_model().to_string());

    let model: Arc<dyn LanguageModel> = match provider {
        Provider::Openai => {
            let key = require(&cli.openai_api_key, "OPENAI_API_KEY", provider)?;
            let config = OpenAiConfig::new(key, &model_name)
                .with_api_url(cli.base_url.clone())
                .with_temperature(MODEL_TEMPERATURE)
                .with_max_retries(MODEL_MAX_RETRIES);
            Arc::new(OpenAiChatModel::new(config)?)
        }
        Provider::Dashscope => {
            let key = require(&cli.dashscope_api_key, "DASHSCOPE_API_KEY", provider)?;
            let config = OpenAiConfig::dashscope(key, &model_name)
                .with_temperature(MODEL_TEMPERATURE)
                .with_max_retries(MODEL_MAX_RETRIES);
            Arc::new(OpenAiChatModel::new(config)?)
        }
        Provider::Gemini => {
            let key = require(&cli.google_api_key, "GOOGLE_API_KEY", provider)?;
            let config = GeminiConfig::new(key, &model_name)
                .with_temperature(MODEL_TEMPERATURE)
                .with_max_retries(MODEL_MAX_RETRIES);
            Arc::new(GeminiChatModel::new(config)?)
        }
    };

    tracing::info!(provider = ?provider, model = %model_name, "model configured");
    Ok(model)
}

/// Plain paths go to the real filesystem, `/fs/` to `<workspace>/fs` and
/// `/memories/` to the long-term store.
pub fn workspace_backend(workspace: PathBuf) -> BackendFactory {
    backend_factory(move |ctx| {
        let mut backend = CompositeBackend::new(Arc::new(FilesystemBackend::new(
            workspace.clone(),
            false,
        )))
        .with_route(
            "/fs/",
            Arc::new(FilesystemBackend::new(workspace.join("fs"), true)),
        );
        if let Some(store) = &ctx.store {
            backend = backend.with_route(
                "/memories/",
                Arc::new(StoreBackend::new(store.clone(), ctx.assistant_id.clone())),
            );
        }
        Arc::new(backend)
    })
}

fn research_tools(cli: &Cli) -> anyhow::Result<Vec<ToolBox>> {
    let mut tools: Vec<ToolBox> = Vec::new();
    match &cli.tavily_api_key {
        Some(key) if !key.trim().is_empty() => {
            tools.push(Arc::new(TavilySearchTool::new(TavilyConfig {
                api_key: key.clone(),
                api_url: None,
            })?));
        }
        _ => tracing::warn!("TAVILY_API_KEY is not set; search-agent runs without web_search"),
    }
    tools.push(Arc::new(FetchUrlTool::new()?));
    Ok(tools)
}

/// A fully assembled agent plus what the launcher needs after the run.
pub struct Session {
    pub agent: DeepAgent,
    pub store: Arc<InMemoryStore>,
    pub layout: DataLayout,
}

pub async fn build_session(
    cli: &Cli,
    model: Arc<dyn LanguageModel>,
    workspace: PathBuf,
) -> anyhow::Result<Session> {
    let profile = cli.profile;
    let layout = DataLayout::new(workspace);
    tokio::fs::create_dir_all(layout.files_dir())
        .await
        .with_context(|| format!("Failed to create {}", layout.files_dir().display()))?;

    let skills_dir = cli
        .skills_dir
        .clone()
        .unwrap_or_else(|| profile.default_skills_dir(&layout.workspace));
    let skills = SkillsMiddleware::new(
        SkillsConfig::new(&skills_dir, ASSISTANT_ID)
            .with_project_skills_dir(cli.project_skills_dir.clone()),
    );
    let shell = ShellMiddleware::new(ShellConfig::new(&layout.workspace));
    tracing::info!(profile = ?profile, skills_dir = %skills_dir.display(), workspace = %layout.workspace.display(), "assembling agent");

    let store = Arc::new(InMemoryStore::new());
    let mut builder = ConfigurableAgentBuilder::new(profile.system_prompt(&layout.workspace))
        .with_model(model.clone())
        .with_backend(workspace_backend(layout.workspace.clone()))
        .with_middleware(Arc::new(skills))
        .with_middleware(Arc::new(shell))
        .with_store(store.clone())
        .with_assistant_id(ASSISTANT_ID)
        .with_long_term_memory(true)
        .with_recursion_limit(cli.recursion_limit);

    match profile {
        Profile::Docs => {
            match load_store_snapshot(&layout.store_file, &store).await {
                Ok(count) => tracing::info!(items = count, path = %layout.store_file.display(), "store memories loaded"),
                Err(e) => tracing::warn!(error = %e, "failed to load store memories"),
            }
            let checkpointer = SqliteCheckpointer::open(&layout.checkpoint_db).await?;
            tracing::info!(path = %layout.checkpoint_db.display(), "checkpointer configured");
            builder = builder
                .with_checkpointer(Arc::new(checkpointer))
                .with_summarization(SummarizationConfig::new(
                    SUMMARY_TRIGGER_TOKENS,
                    SUMMARY_KEEP_MESSAGES,
                ));
        }
        Profile::Research => {
            builder = builder.with_subagent_config(
                SubAgentConfig::new(SEARCH_AGENT_NAME, SEARCH_AGENT_DESCRIPTION, SEARCH_AGENT_PROMPT)
                    .with_tools(research_tools(cli)?)
                    .with_model(model),
            );
        }
    }

    let agent = builder.build()?;
    tracing::info!(
        tools = ?agent.tool_names(),
        recursion_limit = agent.recursion_limit(),
        "deep agent created"
    );
    Ok(Session {
        agent,
        store,
        layout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use deepskill_core::backend::Backend;
    use deepskill_core::state::AgentStateSnapshot;
    use deepskill_core::store::Store;
    use deepskill_runtime::agent::BackendContext;
    use std::sync::RwLock;

    #[test]
    fn docs_prompt_names_the_workspace() {
        let prompt = Profile::Docs.system_prompt(Path::new("/work/space"));
        assert!(prompt.contains("当前工作目录 (CWD): /work/space"));
        assert!(prompt.contains("/work/space/my_file.txt"));
        assert!(!prompt.contains("{workspace_root}"));
    }

    #[test]
    fn skills_dirs_per_profile() {
        let workspace = Path::new("/work");
        assert_eq!(
            Profile::Docs.default_skills_dir(workspace),
            PathBuf::from("/work/agent/skills")
        );
        assert!(Profile::Research
            .default_skills_dir(workspace)
            .ends_with(".deepagents/agent/skills"));
    }

    #[test]
    fn missing_api_key_is_reported() {
        let mut cli = Cli::try_parse_from(["deepskill", "--provider", "gemini"]).unwrap();
        cli.google_api_key = None;
        let err = build_model(&cli).err().unwrap();
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }

    #[tokio::test]
    async fn backend_routes_fs_and_memories() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let factory = workspace_backend(dir.path().to_path_buf());
        let backend = factory(&BackendContext {
            state: Arc::new(RwLock::new(AgentStateSnapshot::default())),
            store: Some(store.clone()),
            assistant_id: ASSISTANT_ID.to_string(),
        });

        backend.write("/fs/report.md", "# 报告").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("fs").join("report.md")).unwrap(),
            "# 报告"
        );

        backend.write("/memories/prefs.md", "concise").await.unwrap();
        assert_eq!(store.len(), 1);
        let items = store
            .search(&[], deepskill_core::store::SearchQuery::all())
            .await
            .unwrap();
        assert_eq!(items[0].key, "/prefs.md");

        let absolute = dir.path().join("plain.txt");
        backend
            .write(&absolute.display().to_string(), "plain")
            .await
            .unwrap();
        assert!(absolute.exists());
    }
}

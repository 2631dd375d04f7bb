use std::path::PathBuf;

use clap::builder::TypedValueParser;
use clap::{Parser, ValueEnum};
use deepskill_runtime::agent::DEFAULT_RECURSION_LIMIT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Profile {
    /// Document processing with skills, shell, summarization and durable memory.
    Docs,
    /// Skills and shell plus a web `search-agent` sub-agent.
    Research,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    /// Any OpenAI-compatible endpoint (OpenAI, Doubao/Ark, ...).
    Openai,
    /// DashScope compatible mode (Tongyi, DeepSeek).
    Dashscope,
    Gemini,
}

#[derive(Debug, Parser)]
#[command(name = "deepskill")]
#[command(about = "Run a skill-aware deep agent on a single query", version)]
pub struct Cli {
    /// Agent profile to run
    #[arg(long, env = "DEEPSKILL_PROFILE", value_enum, default_value_t = Profile::Docs)]
    pub profile: Profile,

    /// Model provider; defaults to dashscope for `docs` and openai for `research`
    #[arg(long, env = "DEEPSKILL_PROVIDER", value_enum)]
    pub provider: Option<Provider>,

    /// Model name; defaults depend on the provider
    #[arg(long, env = "OPENAI_MODEL")]
    pub model: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub base_url: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, hide = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "DASHSCOPE_API_KEY", hide_env_values = true, hide = true)]
    pub dashscope_api_key: Option<String>,

    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true, hide = true)]
    pub google_api_key: Option<String>,

    #[arg(long, env = "TAVILY_API_KEY", hide_env_values = true, hide = true)]
    pub tavily_api_key: Option<String>,

    /// Maximum agent steps per run; each model call and each tool round is one step
    #[arg(
        long,
        env = "RECURSION_LIMIT",
        default_value_t = DEFAULT_RECURSION_LIMIT,
        value_parser = clap::value_parser!(u64).range(1..).map(|v| v as usize)
    )]
    pub recursion_limit: usize,

    /// Conversation thread to resume; a new one is started when omitted
    #[arg(long)]
    pub thread_id: Option<String>,

    /// Workspace root for files, shell commands and persisted data [default: current directory]
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// User skills directory; defaults depend on the profile
    #[arg(long)]
    pub skills_dir: Option<PathBuf>,

    /// Project skills directory, overriding user skills of the same name
    #[arg(long)]
    pub project_skills_dir: Option<PathBuf>,

    /// The query; words are joined with spaces
    #[arg(trailing_var_arg = true)]
    pub query: Vec<String>,
}

impl Cli {
    pub fn provider(&self) -> Provider {
        self.provider.unwrap_or(match self.profile {
            Profile::Docs => Provider::Dashscope,
            Profile::Research => Provider::Openai,
        })
    }

    /// The joined query words, or `None` when no words were given.
    pub fn query_text(&self) -> Option<String> {
        let query = self.query.join(" ");
        (!query.trim().is_empty()).then_some(query)
    }
}

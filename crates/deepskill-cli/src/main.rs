//! `deepskill`: runs one query through a skill-aware deep agent.
//!
//! ```text
//! deepskill --profile docs 把 ./fs/report.docx 转成 markdown
//! deepskill --profile research --thread-id my-thread 分析贵州茅台 600519
//! ```

mod cli;
mod profiles;
mod trajectory;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use deepskill_core::messaging::AgentMessage;
use deepskill_persistence::save_store_snapshot;
use deepskill_runtime::RunConfig;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::profiles::{build_model, build_session};

const RULE: &str = "============================================================";

async fn resolve_workspace(cli: &Cli) -> anyhow::Result<PathBuf> {
    let workspace = match &cli.workspace {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };
    tokio::fs::create_dir_all(&workspace)
        .await
        .with_context(|| format!("Failed to create workspace {}", workspace.display()))?;
    tokio::fs::canonicalize(&workspace)
        .await
        .with_context(|| format!("Failed to resolve workspace {}", workspace.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let workspace = resolve_workspace(&cli).await?;
    let model = build_model(&cli)?;
    let session = build_session(&cli, model, workspace).await?;

    let query = cli
        .query_text()
        .unwrap_or_else(|| cli.profile.default_query().to_string());
    let thread_id = cli
        .thread_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::info!("{RULE}");
    tracing::info!(thread_id = %thread_id, "starting run: {query}");
    tracing::info!("{RULE}");

    let result = session
        .agent
        .invoke(AgentMessage::user(query), &RunConfig::new(thread_id.clone()))
        .await;

    let state = match result {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(thread_id = %thread_id, error = %e, "run failed");
            return Err(e.into());
        }
    };

    if cli.profile.is_durable() {
        match trajectory::write_trajectory(&session.layout.trajectories, &thread_id, &state).await {
            Ok(path) => tracing::info!(path = %path.display(), "trajectory saved"),
            Err(e) => tracing::warn!(error = %e, "failed to save trajectory"),
        }
        match save_store_snapshot(&session.layout.store_file, session.store.as_ref()).await {
            Ok(count) => tracing::info!(items = count, path = %session.layout.store_file.display(), "store memories saved"),
            Err(e) => tracing::warn!(error = %e, "failed to save store memories"),
        }
    }

    println!("\n{RULE}");
    println!("处理结果：");
    println!("{RULE}\n");
    match state.last_message() {
        Some(message) => println!("{}", message.content.to_text()),
        None => println!("未获取到结果"),
    }

    Ok(())
}

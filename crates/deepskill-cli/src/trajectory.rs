//! Run trajectories: the final agent state of each run, kept for evaluation.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local};
use deepskill_core::state::AgentStateSnapshot;

/// Thread ids are user input; anything outside `[A-Za-z0-9_-]` becomes `_`
/// so the name stays a single file inside the trajectories directory.
pub fn trajectory_file_name(thread_id: &str, at: DateTime<Local>) -> String {
    let thread: String = thread_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("run_{}_{}.json", at.format("%Y%m%d_%H%M%S"), thread)
}

/// Writes `state` as pretty JSON into `dir` and returns the file path.
pub async fn write_trajectory(
    dir: &Path,
    thread_id: &str,
    state: &AgentStateSnapshot,
) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let path = dir.join(trajectory_file_name(thread_id, Local::now()));
    let json = serde_json::to_string_pretty(state).context("Failed to serialize trajectory")?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("Failed to write trajectory {}", path.display()))?;
    Ok(path)
}

//! SQLite-backed checkpointer.
//!
//! ## Schema
//!
//! The checkpointer creates its table on first use:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS agent_checkpoints (
//!     thread_id TEXT PRIMARY KEY,
//!     state TEXT NOT NULL,
//!     created_at TEXT NOT NULL,
//!     updated_at TEXT NOT NULL
//! );
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use deepskill_core::persistence::{Checkpointer, ThreadId};
use deepskill_core::state::AgentStateSnapshot;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

pub const DEFAULT_TABLE_NAME: &str = "agent_checkpoints";

/// SQLite checkpointer with a connection pool.
///
/// ```rust,no_run
/// use deepskill_persistence::SqliteCheckpointer;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let checkpointer = SqliteCheckpointer::builder()
///         .path("./checkpoints.db")
///         .table_name("docs_checkpoints")
///         .build()
///         .await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct SqliteCheckpointer {
    pool: SqlitePool,
    table_name: String,
}

impl SqliteCheckpointer {
    /// Connects to `database_url` (e.g. `sqlite://agent.db` or `sqlite::memory:`)
    /// with default settings.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        Self::builder().url(database_url).build().await
    }

    /// Opens (creating if needed) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::builder().path(path.as_ref()).build().await
    }

    pub fn builder() -> SqliteCheckpointerBuilder {
        SqliteCheckpointerBuilder::default()
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn ensure_table(&self) -> anyhow::Result<()> {
        let create_table_sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                thread_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            self.table_name
        );
        sqlx::query(&create_table_sql)
            .execute(&self.pool)
            .await
            .context("Failed to create checkpoints table")?;

        let create_index_sql = format!(
            "CREATE INDEX IF NOT EXISTS idx_{0}_updated_at ON {0} (updated_at DESC)",
            self.table_name
        );
        sqlx::query(&create_index_sql)
            .execute(&self.pool)
            .await
            .context("Failed to create index")?;

        Ok(())
    }
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    async fn save_state(
        &self,
        thread_id: &ThreadId,
        state: &AgentStateSnapshot,
    ) -> anyhow::Result<()> {
        let json =
            serde_json::to_string(state).context("Failed to serialize agent state to JSON")?;
        let now = Utc::now().to_rfc3339();

        let query = format!(
            r#"
            INSERT INTO {} (thread_id, state, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT (thread_id)
            DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at
            "#,
            self.table_name
        );
        sqlx::query(&query)
            .bind(thread_id)
            .bind(&json)
            .bind(&now)
            .execute(&self.pool)
            .await
            .context("Failed to save state to SQLite")?;

        tracing::debug!(
            thread_id = %thread_id,
            table = %self.table_name,
            messages = state.messages.len(),
            "Saved agent state to SQLite"
        );
        Ok(())
    }

    async fn load_state(&self, thread_id: &ThreadId) -> anyhow::Result<Option<AgentStateSnapshot>> {
        let query = format!("SELECT state FROM {} WHERE thread_id = ?1", self.table_name);
        let row: Option<(String,)> = sqlx::query_as(&query)
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load state from SQLite")?;

        match row {
            Some((json,)) => {
                let state: AgentStateSnapshot = serde_json::from_str(&json)
                    .context("Failed to deserialize agent state from JSON")?;
                tracing::debug!(thread_id = %thread_id, table = %self.table_name, "Loaded agent state from SQLite");
                Ok(Some(state))
            }
            None => {
                tracing::debug!(thread_id = %thread_id, table = %self.table_name, "No saved state found in SQLite");
                Ok(None)
            }
        }
    }

    async fn delete_thread(&self, thread_id: &ThreadId) -> anyhow::Result<()> {
        let query = format!("DELETE FROM {} WHERE thread_id = ?1", self.table_name);
        sqlx::query(&query)
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete thread from SQLite")?;
        tracing::debug!(thread_id = %thread_id, table = %self.table_name, "Deleted thread from SQLite");
        Ok(())
    }

    /// Most recently updated first.
    async fn list_threads(&self) -> anyhow::Result<Vec<ThreadId>> {
        let query = format!(
            "SELECT thread_id FROM {} ORDER BY updated_at DESC, thread_id",
            self.table_name
        );
        let rows: Vec<(String,)> = sqlx::query_as(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list threads from SQLite")?;
        Ok(rows.into_iter().map(|(thread_id,)| thread_id).collect())
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn validate_table_name(name: &str) -> anyhow::Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        anyhow::bail!("invalid table name {name:?}: expected [A-Za-z_][A-Za-z0-9_]*");
    }
    Ok(())
}

enum Location {
    Url(String),
    Path(PathBuf),
}

#[derive(Default)]
pub struct SqliteCheckpointerBuilder {
    location: Option<Location>,
    table_name: Option<String>,
    max_connections: Option<u32>,
}

impl SqliteCheckpointerBuilder {
    /// Connection URL such as `sqlite://agent.db` or `sqlite::memory:`.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.location = Some(Location::Url(url.into()));
        self
    }

    /// Database file, created when missing.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(Location::Path(path.into()));
        self
    }

    /// Default: "agent_checkpoints".
    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Default: 5. In-memory databases always use a single connection.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    pub async fn build(self) -> anyhow::Result<SqliteCheckpointer> {
        let table_name = self
            .table_name
            .unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string());
        validate_table_name(&table_name)?;

        let (options, in_memory) = match self.location {
            Some(Location::Url(url)) => {
                let in_memory = url.contains(":memory:");
                let options = SqliteConnectOptions::from_str(&url)
                    .with_context(|| format!("Invalid SQLite URL: {url}"))?;
                (options, in_memory)
            }
            Some(Location::Path(path)) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                (SqliteConnectOptions::new().filename(&path), false)
            }
            None => anyhow::bail!("SQLite URL or path is required"),
        };

        // Every connection to `:memory:` opens a separate database, so the pool
        // must keep exactly one connection alive.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(self.max_connections.unwrap_or(5))
        };

        let pool = pool_options
            .connect_with(options.create_if_missing(true))
            .await
            .context("Failed to connect to SQLite")?;

        let checkpointer = SqliteCheckpointer { pool, table_name };
        checkpointer
            .ensure_table()
            .await
            .context("Failed to initialize database schema")?;

        tracing::info!(table = %checkpointer.table_name, in_memory, "SQLite checkpointer ready");
        Ok(checkpointer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepskill_core::messaging::AgentMessage;
    use deepskill_core::state::{FileData, TodoItem};

    fn sample_state() -> AgentStateSnapshot {
        let mut state = AgentStateSnapshot::default();
        state.messages.push(AgentMessage::user("convert report.docx"));
        state.todos.push(TodoItem::pending("Load the docx skill"));
        state
            .files
            .insert("/fs/report.md".to_string(), FileData::new("# Report"));
        state
            .scratchpad
            .insert("key".to_string(), serde_json::json!("value"));
        state
    }

    async fn memory_checkpointer() -> SqliteCheckpointer {
        SqliteCheckpointer::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let checkpointer = memory_checkpointer().await;
        let thread_id = "thread-1".to_string();
        let state = sample_state();

        checkpointer.save_state(&thread_id, &state).await.unwrap();
        let loaded = checkpointer.load_state(&thread_id).await.unwrap().unwrap();
        assert_eq!(loaded, state);

        assert!(checkpointer
            .load_state(&"missing".to_string())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn save_overwrites_existing_thread() {
        let checkpointer = memory_checkpointer().await;
        let thread_id = "thread-1".to_string();
        checkpointer.save_state(&thread_id, &sample_state()).await.unwrap();

        let mut updated = sample_state();
        updated.messages.push(AgentMessage::agent("done"));
        checkpointer.save_state(&thread_id, &updated).await.unwrap();

        let loaded = checkpointer.load_state(&thread_id).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(checkpointer.list_threads().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_and_delete_threads() {
        let checkpointer = memory_checkpointer().await;
        let state = sample_state();
        checkpointer.save_state(&"a".to_string(), &state).await.unwrap();
        checkpointer.save_state(&"b".to_string(), &state).await.unwrap();

        let threads = checkpointer.list_threads().await.unwrap();
        assert!(threads.contains(&"a".to_string()));
        assert!(threads.contains(&"b".to_string()));

        checkpointer.delete_thread(&"a".to_string()).await.unwrap();
        assert_eq!(checkpointer.list_threads().await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("checkpoints.db");
        let thread_id = "persisted".to_string();

        {
            let checkpointer = SqliteCheckpointer::open(&path).await.unwrap();
            checkpointer.save_state(&thread_id, &sample_state()).await.unwrap();
        }

        let reopened = SqliteCheckpointer::open(&path).await.unwrap();
        assert!(reopened.load_state(&thread_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rejects_unsafe_table_names() {
        let err = SqliteCheckpointer::builder()
            .url("sqlite::memory:")
            .table_name("checkpoints; DROP TABLE x")
            .build()
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("invalid table name"));

        let custom = SqliteCheckpointer::builder()
            .url("sqlite::memory:")
            .table_name("docs_checkpoints")
            .build()
            .await
            .unwrap();
        assert_eq!(custom.table_name(), "docs_checkpoints");
    }

    #[tokio::test]
    async fn builder_requires_a_location() {
        assert!(SqliteCheckpointer::builder().build().await.is_err());
    }
}

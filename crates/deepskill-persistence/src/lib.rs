//! Durable persistence for deepskill agents.
//!
//! - **SQLite** checkpointer for conversation state keyed by thread id
//! - **JSON snapshots** of the long-term memory store
//!
//! ## Feature Flags
//!
//! - `sqlite` (default): enable [`SqliteCheckpointer`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use deepskill_core::store::InMemoryStore;
//! use deepskill_persistence::{load_store_snapshot, SqliteCheckpointer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let checkpointer = SqliteCheckpointer::open("./data/checkpoints.db").await?;
//!     let store = InMemoryStore::new();
//!     load_store_snapshot("./data/store.json", &store).await?;
//!     // Hand both to ConfigurableAgentBuilder
//!     Ok(())
//! }
//! ```

#[cfg(feature = "sqlite")]
pub mod sqlite_checkpointer;
pub mod store_snapshot;

#[cfg(feature = "sqlite")]
pub use sqlite_checkpointer::{SqliteCheckpointer, SqliteCheckpointerBuilder};
pub use store_snapshot::{load_store_snapshot, save_store_snapshot};

pub use deepskill_core::persistence::{Checkpointer, ThreadId};
pub use deepskill_core::state::AgentStateSnapshot;

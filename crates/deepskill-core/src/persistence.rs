//! Checkpointing of thread state between runs.

use crate::state::AgentStateSnapshot;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Conversation thread / session identifier.
pub type ThreadId = String;

/// Persists the full [`AgentStateSnapshot`] of a thread, including its messages.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save_state(&self, thread_id: &ThreadId, state: &AgentStateSnapshot)
        -> anyhow::Result<()>;

    /// `None` when the thread has never been checkpointed.
    async fn load_state(&self, thread_id: &ThreadId) -> anyhow::Result<Option<AgentStateSnapshot>>;

    async fn delete_thread(&self, thread_id: &ThreadId) -> anyhow::Result<()>;

    async fn list_threads(&self) -> anyhow::Result<Vec<ThreadId>>;
}

/// Process-local checkpointer for tests and one-off runs.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointer {
    states: RwLock<HashMap<ThreadId, AgentStateSnapshot>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(_: impl std::fmt::Debug) -> anyhow::Error {
    anyhow::anyhow!("in-memory checkpointer lock poisoned")
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save_state(
        &self,
        thread_id: &ThreadId,
        state: &AgentStateSnapshot,
    ) -> anyhow::Result<()> {
        self.states
            .write()
            .map_err(poisoned)?
            .insert(thread_id.clone(), state.clone());
        tracing::debug!(thread_id = %thread_id, messages = state.messages.len(), "checkpoint saved");
        Ok(())
    }

    async fn load_state(&self, thread_id: &ThreadId) -> anyhow::Result<Option<AgentStateSnapshot>> {
        Ok(self.states.read().map_err(poisoned)?.get(thread_id).cloned())
    }

    async fn delete_thread(&self, thread_id: &ThreadId) -> anyhow::Result<()> {
        self.states.write().map_err(poisoned)?.remove(thread_id);
        Ok(())
    }

    async fn list_threads(&self) -> anyhow::Result<Vec<ThreadId>> {
        let mut threads: Vec<_> = self.states.read().map_err(poisoned)?.keys().cloned().collect();
        threads.sort();
        Ok(threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::AgentMessage;
    use crate::state::TodoItem;

    fn sample_state() -> AgentStateSnapshot {
        let mut state = AgentStateSnapshot::default();
        state.messages.push(AgentMessage::user("hello"));
        state.messages.push(AgentMessage::agent("hi there"));
        state.todos.push(TodoItem::pending("convert the report"));
        state
    }

    #[tokio::test]
    async fn save_then_load_returns_conversation() {
        let checkpointer = InMemoryCheckpointer::new();
        let thread = "thread-a".to_string();
        checkpointer.save_state(&thread, &sample_state()).await.unwrap();

        let loaded = checkpointer.load_state(&thread).await.unwrap().unwrap();
        assert_eq!(loaded, sample_state());
        assert!(checkpointer
            .load_state(&"other".to_string())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn delete_and_list_threads() {
        let checkpointer = InMemoryCheckpointer::new();
        for id in ["b", "a"] {
            checkpointer
                .save_state(&id.to_string(), &sample_state())
                .await
                .unwrap();
        }
        assert_eq!(checkpointer.list_threads().await.unwrap(), vec!["a", "b"]);

        checkpointer.delete_thread(&"a".to_string()).await.unwrap();
        assert_eq!(checkpointer.list_threads().await.unwrap(), vec!["b"]);
    }
}

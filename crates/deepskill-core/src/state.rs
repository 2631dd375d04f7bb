use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::messaging::AgentMessage;

/// Thread-scoped agent state. This is what checkpointers persist and what a
/// run returns as its trajectory.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentStateSnapshot {
    #[serde(default)]
    pub messages: Vec<AgentMessage>,
    #[serde(default)]
    pub todos: Vec<TodoItem>,
    /// Files written through the state backend, keyed by virtual path.
    #[serde(default)]
    pub files: BTreeMap<String, FileData>,
    #[serde(default)]
    pub scratchpad: BTreeMap<String, serde_json::Value>,
}

impl AgentStateSnapshot {
    pub fn last_message(&self) -> Option<&AgentMessage> {
        self.messages.last()
    }

    pub fn apply_diff(&mut self, diff: StateDiff) {
        diff.apply_to(self);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TodoItem {
    pub content: String,
    pub status: TodoStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl TodoItem {
    pub fn pending(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            status: TodoStatus::Pending,
        }
    }
}

/// File contents stored as lines plus RFC 3339 timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileData {
    pub content: Vec<String>,
    pub created_at: String,
    pub modified_at: String,
}

impl FileData {
    pub fn new(content: &str) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            content: split_lines(content),
            created_at: now.clone(),
            modified_at: now,
        }
    }

    /// Replaces the contents, keeping the creation timestamp.
    pub fn update(&mut self, content: &str) {
        self.content = split_lines(content);
        self.modified_at = chrono::Utc::now().to_rfc3339();
    }

    pub fn text(&self) -> String {
        self.content.join("\n")
    }
}

fn split_lines(content: &str) -> Vec<String> {
    content.split('\n').map(str::to_string).collect()
}

/// State delta emitted by tools and applied by the runtime.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StateDiff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todos: Option<Vec<TodoItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<BTreeMap<String, FileData>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratchpad: Option<BTreeMap<String, serde_json::Value>>,
}

impl StateDiff {
    pub fn apply_to(self, snapshot: &mut AgentStateSnapshot) {
        if let Some(todos) = self.todos {
            snapshot.todos = todos;
        }
        if let Some(files) = self.files {
            snapshot.files.extend(files);
        }
        if let Some(scratch) = self.scratchpad {
            snapshot.scratchpad.extend(scratch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_data_round_trips_lines() {
        let mut data = FileData::new("a\nb\n");
        assert_eq!(data.content, vec!["a", "b", ""]);
        assert_eq!(data.text(), "a\nb\n");

        let created = data.created_at.clone();
        data.update("c");
        assert_eq!(data.text(), "c");
        assert_eq!(data.created_at, created);
    }

    #[test]
    fn diff_replaces_todos_and_merges_files() {
        let mut state = AgentStateSnapshot::default();
        state.files.insert("/keep.txt".into(), FileData::new("keep"));
        state.todos.push(TodoItem::pending("old"));

        let mut files = BTreeMap::new();
        files.insert("/new.txt".into(), FileData::new("new"));
        state.apply_diff(StateDiff {
            todos: Some(vec![TodoItem::pending("fresh")]),
            files: Some(files),
            scratchpad: None,
        });

        assert_eq!(state.todos.len(), 1);
        assert_eq!(state.todos[0].content, "fresh");
        assert_eq!(state.files.len(), 2);
    }
}

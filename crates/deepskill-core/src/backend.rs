//! Storage protocol used by the agent's file tools.
//!
//! Paths are virtual absolute paths (`/notes/todo.md`). Implementations live
//! in `deepskill-toolkit`; a composite backend routes paths by prefix.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileInfo {
    pub path: String,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

impl FileInfo {
    pub fn file(path: impl Into<String>, size: u64, modified_at: Option<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            size: Some(size),
            modified_at,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            size: None,
            modified_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GrepMatch {
    pub path: String,
    /// 1-based line number.
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteResult {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditResult {
    pub path: String,
    pub occurrences: usize,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("file '{0}' not found")]
    NotFound(String),
    #[error("cannot write to {0} because it already exists. Read and then make an edit, or write to a new path.")]
    AlreadyExists(String),
    #[error("string not found in file: '{0}'")]
    StringNotFound(String),
    #[error("string '{needle}' appears {count} times in file. Use replace_all=true to replace all instances, or provide a more specific string with surrounding context.")]
    AmbiguousEdit { needle: String, count: usize },
    #[error("line offset {offset} exceeds file length ({lines} lines)")]
    OffsetOutOfRange { offset: usize, lines: usize },
    #[error("path not allowed: {0}")]
    PathNotAllowed(String),
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
    #[error("state lock poisoned")]
    Poisoned,
}

impl BackendError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Entries directly under `path` (non-recursive).
    async fn ls_info(&self, path: &str) -> BackendResult<Vec<FileInfo>>;

    /// File contents formatted with `cat -n` style line numbers.
    async fn read(&self, path: &str, offset: usize, limit: usize) -> BackendResult<String>;

    /// Creates a new file; fails if it already exists.
    async fn write(&self, path: &str, content: &str) -> BackendResult<WriteResult>;

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> BackendResult<EditResult>;

    /// Files under `path` matching a glob `pattern` relative to `path`.
    async fn glob_info(&self, pattern: &str, path: &str) -> BackendResult<Vec<FileInfo>>;

    /// Lines matching the regex `pattern`, optionally restricted to files whose
    /// name matches the `glob`.
    async fn grep_raw(
        &self,
        pattern: &str,
        path: &str,
        glob: Option<&str>,
    ) -> BackendResult<Vec<GrepMatch>>;
}

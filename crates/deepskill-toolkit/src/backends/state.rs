//! Ephemeral backend that keeps files in the thread's [`AgentStateSnapshot`].
//! Files survive exactly as long as the thread checkpoint does.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use deepskill_core::backend::{
    Backend, BackendError, BackendResult, EditResult, FileInfo, GrepMatch, WriteResult,
};
use deepskill_core::state::{AgentStateSnapshot, FileData};

use super::utils;

#[derive(Clone)]
pub struct StateBackend {
    state: Arc<RwLock<AgentStateSnapshot>>,
}

impl StateBackend {
    pub fn new(state: Arc<RwLock<AgentStateSnapshot>>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> Arc<RwLock<AgentStateSnapshot>> {
        self.state.clone()
    }

    fn snapshot_files(&self) -> BackendResult<Vec<(String, FileData)>> {
        let guard = self.state.read().map_err(|_| BackendError::Poisoned)?;
        Ok(guard
            .files
            .iter()
            .map(|(path, data)| (path.clone(), data.clone()))
            .collect())
    }
}

fn info_for(path: &str, data: &FileData) -> FileInfo {
    FileInfo::file(path, data.text().len() as u64, Some(data.modified_at.clone()))
}

#[async_trait]
impl Backend for StateBackend {
    async fn ls_info(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        let dir = utils::normalize_virtual_path(path)?;
        let files = self.snapshot_files()?;
        Ok(utils::direct_children(
            files.iter().map(|(p, d)| (p.as_str(), info_for(p, d))),
            &dir,
        ))
    }

    async fn read(&self, path: &str, offset: usize, limit: usize) -> BackendResult<String> {
        let key = utils::normalize_virtual_path(path)?;
        let guard = self.state.read().map_err(|_| BackendError::Poisoned)?;
        let data = guard
            .files
            .get(&key)
            .ok_or_else(|| BackendError::NotFound(key.clone()))?;
        utils::render_window(&data.text(), offset, limit)
    }

    async fn write(&self, path: &str, content: &str) -> BackendResult<WriteResult> {
        let key = utils::normalize_virtual_path(path)?;
        let mut guard = self.state.write().map_err(|_| BackendError::Poisoned)?;
        if guard.files.contains_key(&key) {
            return Err(BackendError::AlreadyExists(key));
        }
        guard.files.insert(key.clone(), FileData::new(content));
        tracing::debug!(path = %key, "wrote file to agent state");
        Ok(WriteResult { path: key })
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> BackendResult<EditResult> {
        let key = utils::normalize_virtual_path(path)?;
        let mut guard = self.state.write().map_err(|_| BackendError::Poisoned)?;
        let data = guard
            .files
            .get_mut(&key)
            .ok_or_else(|| BackendError::NotFound(key.clone()))?;
        let (updated, occurrences) = utils::replace_in_content(&data.text(), old, new, replace_all)?;
        data.update(&updated);
        Ok(EditResult {
            path: key,
            occurrences,
        })
    }

    async fn glob_info(&self, pattern: &str, path: &str) -> BackendResult<Vec<FileInfo>> {
        let base = utils::as_dir_prefix(&utils::normalize_virtual_path(path)?);
        let matcher = utils::glob_to_regex(pattern)?;
        Ok(self
            .snapshot_files()?
            .iter()
            .filter_map(|(p, d)| {
                let relative = p.strip_prefix(&base)?;
                matcher.is_match(relative).then(|| info_for(p, d))
            })
            .collect())
    }

    async fn grep_raw(
        &self,
        pattern: &str,
        path: &str,
        glob: Option<&str>,
    ) -> BackendResult<Vec<GrepMatch>> {
        let base = utils::normalize_virtual_path(path)?;
        let dir = utils::as_dir_prefix(&base);
        let regex = utils::compile_grep(pattern)?;
        let filter = glob.map(utils::glob_to_regex).transpose()?;
        let mut matches = Vec::new();
        for (p, data) in self.snapshot_files()? {
            if p != base && !p.starts_with(&dir) {
                continue;
            }
            if !utils::passes_file_filter(filter.as_ref(), glob, &p) {
                continue;
            }
            matches.extend(utils::grep_content(&regex, &p, &data.text()));
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> StateBackend {
        StateBackend::new(Arc::new(RwLock::new(AgentStateSnapshot::default())))
    }

    #[tokio::test]
    async fn write_read_edit_cycle() {
        let backend = backend();
        backend.write("/notes/todo.md", "alpha\nbeta").await.unwrap();
        assert!(matches!(
            backend.write("/notes/todo.md", "again").await,
            Err(BackendError::AlreadyExists(_))
        ));

        let read = backend.read("/notes/todo.md", 0, 100).await.unwrap();
        assert!(read.contains("     1\talpha"));
        assert!(read.contains("     2\tbeta"));

        let edit = backend
            .edit("/notes/todo.md", "beta", "gamma", false)
            .await
            .unwrap();
        assert_eq!(edit.occurrences, 1);

        let state = backend.state();
        let guard = state.read().unwrap();
        assert_eq!(guard.files["/notes/todo.md"].text(), "alpha\ngamma");
    }

    #[tokio::test]
    async fn listing_glob_and_grep() {
        let backend = backend();
        backend.write("/a.txt", "hello").await.unwrap();
        backend.write("/docs/b.md", "hello world\nbye").await.unwrap();
        backend.write("/docs/sub/c.md", "nothing").await.unwrap();

        let root: Vec<_> = backend
            .ls_info("/")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(root, vec!["/a.txt", "/docs/"]);

        let md: Vec<_> = backend
            .glob_info("**/*.md", "/")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(md, vec!["/docs/b.md", "/docs/sub/c.md"]);

        let hits = backend.grep_raw("hello", "/", Some("*.md")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/docs/b.md");
        assert_eq!(hits[0].line, 1);
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        assert!(matches!(
            backend().read("/nope.txt", 0, 10).await,
            Err(BackendError::NotFound(path)) if path == "/nope.txt"
        ));
    }
}

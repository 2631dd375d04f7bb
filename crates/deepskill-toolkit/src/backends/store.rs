//! Persistent backend over a [`Store`]. Each file is one item in the
//! `[assistant_id, "filesystem"]` namespace, keyed by its virtual path, with
//! the value `{"content": [lines], "created_at": .., "modified_at": ..}`.

use std::sync::Arc;

use async_trait::async_trait;
use deepskill_core::backend::{
    Backend, BackendError, BackendResult, EditResult, FileInfo, GrepMatch, WriteResult,
};
use deepskill_core::state::FileData;
use deepskill_core::store::{Namespace, SearchQuery, Store, StoreItem};

use super::utils;

pub const FILESYSTEM_NAMESPACE: &str = "filesystem";

#[derive(Clone)]
pub struct StoreBackend {
    store: Arc<dyn Store>,
    namespace: Namespace,
}

impl StoreBackend {
    pub fn new(store: Arc<dyn Store>, assistant_id: impl Into<String>) -> Self {
        Self {
            store,
            namespace: vec![assistant_id.into(), FILESYSTEM_NAMESPACE.to_string()],
        }
    }

    pub fn namespace(&self) -> &[String] {
        &self.namespace
    }

    async fn load(&self, key: &str) -> BackendResult<Option<FileData>> {
        match self.store.get(&self.namespace, key).await? {
            Some(item) => Ok(decode(&item)),
            None => Ok(None),
        }
    }

    async fn save(&self, key: &str, data: &FileData) -> BackendResult<()> {
        let value = serde_json::to_value(data)
            .map_err(|e| BackendError::io(key, std::io::Error::other(e)))?;
        self.store.put(&self.namespace, key, value).await?;
        Ok(())
    }

    /// Every file in this backend's namespace, ordered by path.
    async fn all_files(&self) -> BackendResult<Vec<(String, FileData)>> {
        let items = self.store.search(&self.namespace, SearchQuery::all()).await?;
        Ok(items
            .iter()
            .filter(|item| item.namespace == self.namespace)
            .filter_map(|item| decode(item).map(|data| (item.key.clone(), data)))
            .collect())
    }
}

fn decode(item: &StoreItem) -> Option<FileData> {
    match serde_json::from_value::<FileData>(item.value.clone()) {
        Ok(data) => Some(data),
        Err(e) => {
            tracing::warn!(key = %item.key, error = %e, "ignoring malformed file item in store");
            None
        }
    }
}

fn info_for(path: &str, data: &FileData) -> FileInfo {
    FileInfo::file(path, data.text().len() as u64, Some(data.modified_at.clone()))
}

#[async_trait]
impl Backend for StoreBackend {
    async fn ls_info(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        let dir = utils::normalize_virtual_path(path)?;
        let files = self.all_files().await?;
        Ok(utils::direct_children(
            files.iter().map(|(p, d)| (p.as_str(), info_for(p, d))),
            &dir,
        ))
    }

    async fn read(&self, path: &str, offset: usize, limit: usize) -> BackendResult<String> {
        let key = utils::normalize_virtual_path(path)?;
        let data = self
            .load(&key)
            .await?
            .ok_or_else(|| BackendError::NotFound(key.clone()))?;
        utils::render_window(&data.text(), offset, limit)
    }

    async fn write(&self, path: &str, content: &str) -> BackendResult<WriteResult> {
        let key = utils::normalize_virtual_path(path)?;
        if self.store.get(&self.namespace, &key).await?.is_some() {
            return Err(BackendError::AlreadyExists(key));
        }
        self.save(&key, &FileData::new(content)).await?;
        tracing::debug!(path = %key, namespace = ?self.namespace, "stored file");
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
        let mut data = self
            .load(&key)
            .await?
            .ok_or_else(|| BackendError::NotFound(key.clone()))?;
        let (updated, occurrences) = utils::replace_in_content(&data.text(), old, new, replace_all)?;
        data.update(&updated);
        self.save(&key, &data).await?;
        Ok(EditResult {
            path: key,
            occurrences,
        })
    }

    async fn glob_info(&self, pattern: &str, path: &str) -> BackendResult<Vec<FileInfo>> {
        let base = utils::as_dir_prefix(&utils::normalize_virtual_path(path)?);
        let matcher = utils::glob_to_regex(pattern)?;
        Ok(self
            .all_files()
            .await?
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
        for (p, data) in self.all_files().await? {
            if (p == base || p.starts_with(&dir))
                && utils::passes_file_filter(filter.as_ref(), glob, &p)
            {
                matches.extend(utils::grep_content(&regex, &p, &data.text()));
            }
        }
        Ok(matches)
    }
}

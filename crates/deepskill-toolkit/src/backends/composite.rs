//! Routes paths to backends by longest matching prefix.
//!
//! `/memories/a.txt` with a `/memories/` route reaches the routed backend as
//! `/a.txt`; results come back re-prefixed. Unrouted paths go to the default
//! backend.

use std::sync::Arc;

use async_trait::async_trait;
use deepskill_core::backend::{
    Backend, BackendError, BackendResult, EditResult, FileInfo, GrepMatch, WriteResult,
};

#[derive(Clone)]
pub struct CompositeBackend {
    default: Arc<dyn Backend>,
    /// Sorted longest prefix first.
    routes: Vec<(String, Arc<dyn Backend>)>,
}

impl CompositeBackend {
    pub fn new(default: Arc<dyn Backend>) -> Self {
        Self {
            default,
            routes: Vec::new(),
        }
    }

    /// Adds a route. Prefixes are normalized to `/name/`.
    pub fn with_route(mut self, prefix: impl AsRef<str>, backend: Arc<dyn Backend>) -> Self {
        let trimmed = prefix.as_ref().trim_matches('/');
        let prefix = format!("/{trimmed}/");
        self.routes.retain(|(existing, _)| existing != &prefix);
        self.routes.push((prefix, backend));
        self.routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    pub fn route_prefixes(&self) -> Vec<&str> {
        self.routes.iter().map(|(p, _)| p.as_str()).collect()
    }

    /// Backend, stripped path and matched prefix for `path`.
    fn route<'a>(&'a self, path: &str) -> (&'a Arc<dyn Backend>, String, Option<&'a str>) {
        for (prefix, backend) in &self.routes {
            let bare = prefix.trim_end_matches('/');
            if path == bare || path.starts_with(prefix.as_str()) {
                let rest = &path[bare.len()..];
                let stripped = if rest.is_empty() { "/" } else { rest };
                return (backend, stripped.to_string(), Some(prefix.as_str()));
            }
        }
        (&self.default, path.to_string(), None)
    }

    /// Routes living under `path`, used when aggregating glob and grep.
    fn routes_under<'a>(&'a self, path: &str) -> impl Iterator<Item = &'a (String, Arc<dyn Backend>)> {
        let dir = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        self.routes.iter().filter(move |(prefix, _)| prefix.starts_with(&dir))
    }
}

fn reprefix(prefix: Option<&str>, path: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}{}", prefix.trim_end_matches('/'), path),
        None => path.to_string(),
    }
}

/// Rewrites paths inside errors so the agent sees the path it asked for.
fn reprefix_error(prefix: Option<&str>, err: BackendError) -> BackendError {
    if prefix.is_none() {
        return err;
    }
    match err {
        BackendError::NotFound(p) => BackendError::NotFound(reprefix(prefix, &p)),
        BackendError::AlreadyExists(p) => BackendError::AlreadyExists(reprefix(prefix, &p)),
        BackendError::PathNotAllowed(p) => BackendError::PathNotAllowed(reprefix(prefix, &p)),
        other => other,
    }
}

fn reprefix_infos(prefix: Option<&str>, infos: Vec<FileInfo>) -> Vec<FileInfo> {
    infos
        .into_iter()
        .map(|mut info| {
            info.path = reprefix(prefix, &info.path);
            info
        })
        .collect()
}

fn reprefix_matches(prefix: Option<&str>, matches: Vec<GrepMatch>) -> Vec<GrepMatch> {
    matches
        .into_iter()
        .map(|mut m| {
            m.path = reprefix(prefix, &m.path);
            m
        })
        .collect()
}

#[async_trait]
impl Backend for CompositeBackend {
    async fn ls_info(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        let (backend, stripped, prefix) = self.route(path);
        if prefix.is_some() {
            let infos = backend
                .ls_info(&stripped)
                .await
                .map_err(|e| reprefix_error(prefix, e))?;
            return Ok(reprefix_infos(prefix, infos));
        }

        let mut infos = self.default.ls_info(path).await?;
        if path == "/" {
            for (route, _) in &self.routes {
                if !infos.iter().any(|i| i.path == *route) {
                    infos.push(FileInfo::dir(route.clone()));
                }
            }
            infos.sort_by(|a, b| a.path.cmp(&b.path));
        }
        Ok(infos)
    }

    async fn read(&self, path: &str, offset: usize, limit: usize) -> BackendResult<String> {
        let (backend, stripped, prefix) = self.route(path);
        backend
            .read(&stripped, offset, limit)
            .await
            .map_err(|e| reprefix_error(prefix, e))
    }

    async fn write(&self, path: &str, content: &str) -> BackendResult<WriteResult> {
        let (backend, stripped, prefix) = self.route(path);
        let result = backend
            .write(&stripped, content)
            .await
            .map_err(|e| reprefix_error(prefix, e))?;
        Ok(WriteResult {
            path: reprefix(prefix, &result.path),
        })
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> BackendResult<EditResult> {
        let (backend, stripped, prefix) = self.route(path);
        let result = backend
            .edit(&stripped, old, new, replace_all)
            .await
            .map_err(|e| reprefix_error(prefix, e))?;
        Ok(EditResult {
            path: reprefix(prefix, &result.path),
            occurrences: result.occurrences,
        })
    }

    async fn glob_info(&self, pattern: &str, path: &str) -> BackendResult<Vec<FileInfo>> {
        let (backend, stripped, prefix) = self.route(path);
        if prefix.is_some() {
            let infos = backend
                .glob_info(pattern, &stripped)
                .await
                .map_err(|e| reprefix_error(prefix, e))?;
            return Ok(reprefix_infos(prefix, infos));
        }

        let mut infos = self.default.glob_info(pattern, path).await?;
        for (route, routed) in self.routes_under(path) {
            let found = routed.glob_info(pattern, "/").await?;
            infos.extend(reprefix_infos(Some(route), found));
        }
        Ok(infos)
    }

    async fn grep_raw(
        &self,
        pattern: &str,
        path: &str,
        glob: Option<&str>,
    ) -> BackendResult<Vec<GrepMatch>> {
        let (backend, stripped, prefix) = self.route(path);
        if prefix.is_some() {
            let matches = backend
                .grep_raw(pattern, &stripped, glob)
                .await
                .map_err(|e| reprefix_error(prefix, e))?;
            return Ok(reprefix_matches(prefix, matches));
        }

        let mut matches = self.default.grep_raw(pattern, path, glob).await?;
        for (route, routed) in self.routes_under(path) {
            let found = routed.grep_raw(pattern, "/", glob).await?;
            matches.extend(reprefix_matches(Some(route), found));
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{StateBackend, StoreBackend};
    use deepskill_core::state::AgentStateSnapshot;
    use deepskill_core::store::InMemoryStore;
    use std::sync::RwLock;

    fn composite() -> (CompositeBackend, Arc<StateBackend>, Arc<StoreBackend>) {
        let state = Arc::new(StateBackend::new(Arc::new(RwLock::new(
            AgentStateSnapshot::default(),
        ))));
        let memories = Arc::new(StoreBackend::new(Arc::new(InMemoryStore::new()), "agent"));
        let backend = CompositeBackend::new(state.clone()).with_route("/memories/", memories.clone());
        (backend, state, memories)
    }

    #[tokio::test]
    async fn routed_writes_strip_and_restore_prefix() {
        let (backend, state, memories) = composite();
        let written = backend.write("/memories/a.txt", "remember").await.unwrap();
        assert_eq!(written.path, "/memories/a.txt");

        assert!(memories.read("/a.txt", 0, 10).await.is_ok());
        assert!(matches!(
            state.read("/memories/a.txt", 0, 10).await,
            Err(BackendError::NotFound(_))
        ));

        let err = backend.read("/memories/missing.txt", 0, 10).await.unwrap_err();
        assert_eq!(err.to_string(), "file '/memories/missing.txt' not found");
    }

    #[tokio::test]
    async fn root_listing_includes_routes() {
        let (backend, _, _) = composite();
        backend.write("/draft.md", "x").await.unwrap();
        let paths: Vec<_> = backend
            .ls_info("/")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(paths, vec!["/draft.md", "/memories/"]);

        backend.write("/memories/notes/b.md", "y").await.unwrap();
        let routed: Vec<_> = backend
            .ls_info("/memories/")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(routed, vec!["/memories/notes/"]);
    }

    #[tokio::test]
    async fn glob_and_grep_aggregate_across_routes() {
        let (backend, _, _) = composite();
        backend.write("/draft.md", "needle here").await.unwrap();
        backend.write("/memories/prefs.md", "needle too").await.unwrap();

        let mut paths: Vec<_> = backend
            .glob_info("**/*.md", "/")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["/draft.md", "/memories/prefs.md"]);

        let hits = backend.grep_raw("needle", "/", None).await.unwrap();
        assert_eq!(hits.len(), 2);

        let routed_only = backend.grep_raw("needle", "/memories/", None).await.unwrap();
        assert_eq!(routed_only.len(), 1);
        assert_eq!(routed_only[0].path, "/memories/prefs.md");
    }

    #[test]
    fn longest_prefix_wins() {
        let (backend, _, memories) = composite();
        let backend = backend.with_route("/memories/archive", memories);
        assert_eq!(backend.route_prefixes(), vec!["/memories/archive/", "/memories/"]);
        let (_, stripped, prefix) = backend.route("/memories/archive/old.md");
        assert_eq!(stripped, "/old.md");
        assert_eq!(prefix, Some("/memories/archive/"));
    }
}

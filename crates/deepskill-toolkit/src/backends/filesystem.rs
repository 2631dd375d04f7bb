//! Backend that reads and writes real files under a root directory.
//!
//! In virtual mode every path is interpreted relative to `root` and may not
//! escape it (`..`, `~` and symlinks pointing outside are rejected). Outside
//! virtual mode absolute paths are used as-is and relative paths resolve
//! against `root`.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deepskill_core::backend::{
    Backend, BackendError, BackendResult, EditResult, FileInfo, GrepMatch, WriteResult,
};
use walkdir::WalkDir;

use super::utils;

/// Files bigger than this are skipped by grep.
pub const MAX_GREP_FILE_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    root: PathBuf,
    virtual_mode: bool,
}

impl FilesystemBackend {
    pub fn new(root: impl Into<PathBuf>, virtual_mode: bool) -> Self {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&root))
                .unwrap_or(root)
        };
        Self {
            root: lexical_normalize(&root),
            virtual_mode,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_virtual(&self) -> bool {
        self.virtual_mode
    }

    /// Maps an agent-facing path to a real path.
    pub fn resolve(&self, key: &str) -> BackendResult<PathBuf> {
        if !self.virtual_mode {
            let path = Path::new(key);
            return Ok(if path.is_absolute() {
                path.to_path_buf()
            } else {
                self.root.join(path)
            });
        }

        let virtual_path = utils::normalize_virtual_path(key)?;
        let full = self.root.join(virtual_path.trim_start_matches('/'));
        if !self.stays_in_root(&full) {
            return Err(BackendError::PathNotAllowed(key.to_string()));
        }
        Ok(full)
    }

    /// Checks the nearest existing ancestor of `full`, so a file that does not
    /// exist yet cannot be created through a symlinked directory.
    fn stays_in_root(&self, full: &Path) -> bool {
        for ancestor in full.ancestors() {
            match ancestor.canonicalize() {
                Ok(canonical) => {
                    // Nothing under a root that does not exist yet can be a symlink.
                    if !ancestor.starts_with(&self.root) {
                        return true;
                    }
                    let root = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
                    return canonical.starts_with(&root);
                }
                // Dangling symlink: its target is unknown until it is created.
                Err(_) if ancestor.is_symlink() => return false,
                Err(_) => continue,
            }
        }
        true
    }

    /// Maps a real path back to the agent-facing form.
    fn to_key(&self, path: &Path) -> String {
        if !self.virtual_mode {
            return path.to_string_lossy().into_owned();
        }
        match path.strip_prefix(&self.root) {
            Ok(relative) => {
                let parts: Vec<_> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                format!("/{}", parts.join("/"))
            }
            Err(_) => path.to_string_lossy().into_owned(),
        }
    }

    fn describe(&self, path: &Path, metadata: &std::fs::Metadata) -> FileInfo {
        let modified_at = metadata
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339());
        let key = self.to_key(path);
        if metadata.is_dir() {
            FileInfo::dir(utils::as_dir_prefix(&key))
        } else {
            FileInfo::file(key, metadata.len(), modified_at)
        }
    }

    /// Regular files under `base`, sorted by path. Symlinked files that leave
    /// the root are dropped in virtual mode.
    fn walk_files(&self, base: &Path) -> Vec<PathBuf> {
        let root = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
        WalkDir::new(base)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file() || entry.path_is_symlink())
            .filter(|entry| {
                if !self.virtual_mode || !entry.path_is_symlink() {
                    return true;
                }
                entry
                    .path()
                    .canonicalize()
                    .map(|target| target.starts_with(&root) && target.is_file())
                    .unwrap_or(false)
            })
            .map(|entry| entry.into_path())
            .collect()
    }
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[async_trait]
impl Backend for FilesystemBackend {
    async fn ls_info(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        let dir = self.resolve(path)?;
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackendError::io(path, e)),
        };
        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| BackendError::io(path, e))?
        {
            let entry_path = entry.path();
            if self.virtual_mode && self.resolve(&self.to_key(&entry_path)).is_err() {
                continue;
            }
            match tokio::fs::metadata(&entry_path).await {
                Ok(metadata) => entries.push(self.describe(&entry_path, &metadata)),
                Err(e) => tracing::debug!(path = %entry_path.display(), error = %e, "skipping unreadable entry"),
            }
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn read(&self, path: &str, offset: usize, limit: usize) -> BackendResult<String> {
        let full = self.resolve(path)?;
        let content = match tokio::fs::read_to_string(&full).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackendError::NotFound(path.to_string()))
            }
            Err(e) => return Err(BackendError::io(path, e)),
        };
        utils::render_window(&content, offset, limit)
    }

    async fn write(&self, path: &str, content: &str) -> BackendResult<WriteResult> {
        let full = self.resolve(path)?;
        if tokio::fs::try_exists(&full)
            .await
            .map_err(|e| BackendError::io(path, e))?
        {
            return Err(BackendError::AlreadyExists(path.to_string()));
        }
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BackendError::io(path, e))?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| BackendError::io(path, e))?;
        tracing::debug!(path = %full.display(), bytes = content.len(), "wrote file");
        Ok(WriteResult {
            path: self.to_key(&full),
        })
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> BackendResult<EditResult> {
        let full = self.resolve(path)?;
        let content = match tokio::fs::read_to_string(&full).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackendError::NotFound(path.to_string()))
            }
            Err(e) => return Err(BackendError::io(path, e)),
        };
        let (updated, occurrences) = utils::replace_in_content(&content, old, new, replace_all)?;
        tokio::fs::write(&full, updated)
            .await
            .map_err(|e| BackendError::io(path, e))?;
        Ok(EditResult {
            path: self.to_key(&full),
            occurrences,
        })
    }

    async fn glob_info(&self, pattern: &str, path: &str) -> BackendResult<Vec<FileInfo>> {
        let base = self.resolve(path)?;
        let matcher = utils::glob_to_regex(pattern)?;
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            this.walk_files(&base)
                .into_iter()
                .filter_map(|file| {
                    let relative = file.strip_prefix(&base).ok()?;
                    let relative = relative.to_string_lossy().replace('\\', "/");
                    if !matcher.is_match(&relative) {
                        return None;
                    }
                    let metadata = std::fs::metadata(&file).ok()?;
                    Some(this.describe(&file, &metadata))
                })
                .collect()
        })
        .await
        .map_err(|e| BackendError::io(path, std::io::Error::other(e)))
    }

    async fn grep_raw(
        &self,
        pattern: &str,
        path: &str,
        glob: Option<&str>,
    ) -> BackendResult<Vec<GrepMatch>> {
        let base = self.resolve(path)?;
        let regex = utils::compile_grep(pattern)?;
        let filter = glob.map(utils::glob_to_regex).transpose()?;
        let glob = glob.map(str::to_string);
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            let files = if base.is_file() {
                vec![base.clone()]
            } else {
                this.walk_files(&base)
            };
            let mut matches = Vec::new();
            for file in files {
                let relative = file
                    .strip_prefix(&base)
                    .map(|r| r.to_string_lossy().replace('\\', "/"))
                    .unwrap_or_default();
                if !utils::passes_file_filter(filter.as_ref(), glob.as_deref(), &relative) {
                    continue;
                }
                let too_big = std::fs::metadata(&file)
                    .map(|m| m.len() > MAX_GREP_FILE_BYTES)
                    .unwrap_or(true);
                if too_big {
                    continue;
                }
                // Binary and non UTF-8 files are skipped.
                let Ok(content) = std::fs::read_to_string(&file) else {
                    continue;
                };
                matches.extend(utils::grep_content(&regex, &this.to_key(&file), &content));
            }
            matches
        })
        .await
        .map_err(|e| BackendError::io(path, std::io::Error::other(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn virtual_mode_confines_paths_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path(), true);

        let written = backend.write("/reports/q1.md", "revenue up").await.unwrap();
        assert_eq!(written.path, "/reports/q1.md");
        assert!(dir.path().join("reports/q1.md").exists());

        assert!(matches!(
            backend.read("/../etc/passwd", 0, 10).await,
            Err(BackendError::PathNotAllowed(_))
        ));
        assert!(matches!(
            backend.write("~/x", "y").await,
            Err(BackendError::PathNotAllowed(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn virtual_mode_rejects_new_files_under_symlinked_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let backend = FilesystemBackend::new(dir.path(), true);

        assert!(matches!(
            backend.write("/link/pwned.txt", "escaped").await,
            Err(BackendError::PathNotAllowed(_))
        ));
        assert!(matches!(
            backend.write("/link/nested/deeper.txt", "escaped").await,
            Err(BackendError::PathNotAllowed(_))
        ));
        assert!(!outside.path().join("pwned.txt").exists());
        assert!(!outside.path().join("nested").exists());

        std::os::unix::fs::symlink(outside.path().join("missing"), dir.path().join("dangling"))
            .unwrap();
        assert!(matches!(
            backend.write("/dangling/x.txt", "escaped").await,
            Err(BackendError::PathNotAllowed(_))
        ));

        let written = backend.write("/fresh/dir/note.md", "inside").await.unwrap();
        assert_eq!(written.path, "/fresh/dir/note.md");
    }

    #[tokio::test]
    async fn ls_marks_directories_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let backend = FilesystemBackend::new(dir.path(), true);

        let listing = backend.ls_info("/").await.unwrap();
        let paths: Vec<_> = listing.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/a.txt", "/b.txt", "/sub/"]);
        assert!(listing[2].is_dir);
        assert_eq!(listing[0].size, Some(1));
    }

    #[tokio::test]
    async fn edit_glob_and_grep_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path(), true);
        backend.write("/src/main.rs", "fn main() {}\n// TODO").await.unwrap();
        backend.write("/README.md", "TODO: docs").await.unwrap();

        let edit = backend.edit("/README.md", "docs", "guide", false).await.unwrap();
        assert_eq!(edit.occurrences, 1);
        let read = backend.read("/README.md", 0, 10).await.unwrap();
        assert!(read.contains("TODO: guide"));

        let rs: Vec<_> = backend
            .glob_info("**/*.rs", "/")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(rs, vec!["/src/main.rs"]);

        let hits = backend.grep_raw("TODO", "/", None).await.unwrap();
        let paths: Vec<_> = hits.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["/README.md", "/src/main.rs"]);
        assert_eq!(hits[1].line, 2);

        let only_md = backend.grep_raw("TODO", "/", Some("*.md")).await.unwrap();
        assert_eq!(only_md.len(), 1);
    }

    #[tokio::test]
    async fn non_virtual_mode_uses_absolute_paths() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path(), false);
        let absolute = dir.path().join("abs.txt");
        let key = absolute.to_string_lossy().into_owned();
        backend.write(&key, "x").await.unwrap();
        assert!(absolute.exists());

        backend.write("rel.txt", "y").await.unwrap();
        assert!(dir.path().join("rel.txt").exists());
    }
}

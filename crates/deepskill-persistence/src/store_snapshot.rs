//! JSON snapshots of the long-term memory store.
//!
//! The file is a pretty-printed array of `{namespace, key, value}` entries.
//! Timestamps are written too and honored on load when present.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use deepskill_core::store::{InMemoryStore, Namespace, SearchQuery, Store, StoreError, StoreItem};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    namespace: Namespace,
    key: String,
    value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

/// Restores every entry of the snapshot at `path` into `store` and returns
/// how many were loaded. A missing file loads nothing. Entries with an
/// invalid namespace are skipped.
pub async fn load_store_snapshot(path: impl AsRef<Path>, store: &InMemoryStore) -> anyhow::Result<usize> {
    let path = path.as_ref();
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no store snapshot to load");
            return Ok(0);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read store snapshot {}", path.display()))
        }
    };

    let entries: Vec<SnapshotEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("Malformed store snapshot {}", path.display()))?;

    let now = Utc::now();
    let mut count = 0;
    for entry in entries {
        let created_at = entry.created_at.unwrap_or(now);
        let namespace = entry.namespace.join("/");
        let key = entry.key.clone();
        match store.restore(StoreItem {
            namespace: entry.namespace,
            key: entry.key,
            value: entry.value,
            created_at,
            updated_at: entry.updated_at.unwrap_or(created_at),
        }) {
            Ok(()) => count += 1,
            Err(StoreError::InvalidNamespace(reason)) => {
                tracing::warn!(namespace = %namespace, key = %key, reason = %reason, "skipping store snapshot entry");
            }
            Err(e) => return Err(e).context("Failed to restore store item"),
        }
    }

    tracing::info!(path = %path.display(), items = count, "loaded store snapshot");
    Ok(count)
}

/// Writes every item of `store` to `path`, creating parent directories.
/// Returns the number of items written.
pub async fn save_store_snapshot(path: impl AsRef<Path>, store: &dyn Store) -> anyhow::Result<usize> {
    let path = path.as_ref();
    let items = store
        .search(&[], SearchQuery::all())
        .await
        .context("Failed to read store items")?;

    let entries: Vec<SnapshotEntry> = items
        .into_iter()
        .map(|item| SnapshotEntry {
            namespace: item.namespace,
            key: item.key,
            value: item.value,
            created_at: Some(item.created_at),
            updated_at: Some(item.updated_at),
        })
        .collect();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&entries).context("Failed to serialize store snapshot")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write store snapshot {}", path.display()))?;

    tracing::info!(path = %path.display(), items = entries.len(), "saved store snapshot");
    Ok(entries.len())
}

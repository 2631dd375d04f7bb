//! Namespaced key/value store for long-lived agent memories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;

/// Hierarchical namespace, e.g. `["agent", "filesystem"]`.
pub type Namespace = Vec<String>;

pub fn namespace<I, S>(parts: I) -> Namespace
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreItem {
    pub namespace: Namespace,
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Case-insensitive text matched against the serialized value.
    pub query: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl SearchQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    Poisoned,
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn put(&self, namespace: &[String], key: &str, value: Value) -> Result<(), StoreError>;

    async fn get(&self, namespace: &[String], key: &str) -> Result<Option<StoreItem>, StoreError>;

    async fn delete(&self, namespace: &[String], key: &str) -> Result<(), StoreError>;

    /// Items whose namespace starts with `prefix`, ordered by namespace then key.
    async fn search(
        &self,
        prefix: &[String],
        query: SearchQuery,
    ) -> Result<Vec<StoreItem>, StoreError>;

    /// Distinct namespaces starting with `prefix`.
    async fn list_namespaces(&self, prefix: &[String]) -> Result<Vec<Namespace>, StoreError>;
}

/// Process-local store; see `deepskill-persistence` for JSON snapshots.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: RwLock<BTreeMap<(Namespace, String), StoreItem>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an item verbatim, keeping its timestamps. Used when restoring
    /// snapshots.
    pub fn restore(&self, item: StoreItem) -> Result<(), StoreError> {
        validate_namespace(&item.namespace)?;
        self.items
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .insert((item.namespace.clone(), item.key.clone()), item);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_namespace(namespace: &[String]) -> Result<(), StoreError> {
    if namespace.is_empty() {
        return Err(StoreError::InvalidNamespace("namespace cannot be empty".into()));
    }
    if let Some(label) = namespace.iter().find(|l| l.is_empty() || l.contains('.')) {
        return Err(StoreError::InvalidNamespace(format!(
            "label {label:?} must be non-empty and must not contain '.'"
        )));
    }
    Ok(())
}

fn matches_query(item: &StoreItem, query: Option<&str>) -> bool {
    match query {
        None => true,
        Some(q) if q.is_empty() => true,
        Some(q) => item
            .value
            .to_string()
            .to_lowercase()
            .contains(&q.to_lowercase()),
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put(&self, namespace: &[String], key: &str, value: Value) -> Result<(), StoreError> {
        validate_namespace(namespace)?;
        let now = Utc::now();
        let mut items = self.items.write().map_err(|_| StoreError::Poisoned)?;
        let entry_key = (namespace.to_vec(), key.to_string());
        let created_at = items.get(&entry_key).map_or(now, |existing| existing.created_at);
        items.insert(
            entry_key,
            StoreItem {
                namespace: namespace.to_vec(),
                key: key.to_string(),
                value,
                created_at,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn get(&self, namespace: &[String], key: &str) -> Result<Option<StoreItem>, StoreError> {
        let items = self.items.read().map_err(|_| StoreError::Poisoned)?;
        Ok(items.get(&(namespace.to_vec(), key.to_string())).cloned())
    }

    async fn delete(&self, namespace: &[String], key: &str) -> Result<(), StoreError> {
        self.items
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .remove(&(namespace.to_vec(), key.to_string()));
        Ok(())
    }

    async fn search(
        &self,
        prefix: &[String],
        query: SearchQuery,
    ) -> Result<Vec<StoreItem>, StoreError> {
        let items = self.items.read().map_err(|_| StoreError::Poisoned)?;
        let matched = items
            .values()
            .filter(|item| item.namespace.starts_with(prefix))
            .filter(|item| matches_query(item, query.query.as_deref()))
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(matched)
    }

    async fn list_namespaces(&self, prefix: &[String]) -> Result<Vec<Namespace>, StoreError> {
        let items = self.items.read().map_err(|_| StoreError::Poisoned)?;
        let mut namespaces: Vec<Namespace> = items
            .keys()
            .map(|(ns, _)| ns)
            .filter(|ns| ns.starts_with(prefix))
            .cloned()
            .collect();
        namespaces.dedup();
        Ok(namespaces)
    }
}

//! Persisted key/value store contract.
//!
//! The pipeline only needs four asynchronous operations from the host
//! platform. Two implementations ship with the crate: an in-memory store and a
//! single-file JSON store used by the command-line companion.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use toto_common::ApiError;
use tracing::debug;

/// Errors raised by store implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored document is not valid JSON
    #[error("Corrupt store document: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::storage(err.to_string())
    }
}

/// Asynchronous string key/value store.
///
/// `multi_set` and `multi_remove` must apply all of their keys or none, so
/// that related entries are never observed half-updated.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a single value.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Write several values at once.
    async fn multi_set(&self, pairs: Vec<(String, String)>) -> StoreResult<()>;

    /// Remove several keys at once. Missing keys are ignored.
    async fn multi_remove(&self, keys: &[&str]) -> StoreResult<()>;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with entries.
    #[must_use]
    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn multi_set(&self, pairs: Vec<(String, String)>) -> StoreResult<()> {
        self.entries.write().await.extend(pairs);
        Ok(())
    }

    async fn multi_remove(&self, keys: &[&str]) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

/// Store persisted as one JSON object on disk.
///
/// Every write rewrites the document through a temporary file and a rename,
/// so a crash leaves either the old or the new document.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Create a store backed by `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> StoreResult<HashMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, document: &HashMap<String, String>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(document)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), entries = document.len(), "Store persisted");
        Ok(())
    }

    async fn update<F>(&self, apply: F) -> StoreResult<()>
    where
        F: FnOnce(&mut HashMap<String, String>) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        apply(&mut document);
        self.write_document(&document).await
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_document().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.update(move |doc| {
            doc.insert(key, value);
        })
        .await
    }

    async fn multi_set(&self, pairs: Vec<(String, String)>) -> StoreResult<()> {
        self.update(move |doc| doc.extend(pairs)).await
    }

    async fn multi_remove(&self, keys: &[&str]) -> StoreResult<()> {
        let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
        self.update(move |doc| {
            for key in &keys {
                doc.remove(key);
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.set("a", "1").await.unwrap();
        store
            .multi_set(vec![("b".into(), "2".into()), ("c".into(), "3".into())])
            .await
            .unwrap();

        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.len().await, 3);

        store.multi_remove(&["a", "b", "missing"]).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("c").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileStore::new(&path);
        assert_eq!(store.get("accessToken").await.unwrap(), None);
        store
            .multi_set(vec![
                ("accessToken".into(), "tok".into()),
                ("refreshToken".into(), "ref".into()),
            ])
            .await
            .unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.get("refreshToken").await.unwrap().as_deref(),
            Some("ref")
        );

        reopened
            .multi_remove(&["accessToken", "refreshToken"])
            .await
            .unwrap();
        assert_eq!(store.get("accessToken").await.unwrap(), None);
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let err = FileStore::new(&path).get("user").await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
        assert!(matches!(ApiError::from(err), ApiError::Storage(_)));
    }
}

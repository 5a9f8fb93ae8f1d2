//! Key-value document store.
//!
//! Collections, resources, feedback docs, eval test cases/runs and (optionally)
//! adapter records are all persisted through this trait. Keys are namespaced by
//! the caller, e.g. `collection:{id}`, `resource:{id}`, `feedback:{id}`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};

use crate::types::{AppError, Result};

/// Abstract trait for document-store operations.
///
/// Kept strictly object-safe (`Arc<dyn DocumentStore>` is the shape callers hold);
/// the JSON convenience methods live on the [`DocumentStoreExt`] blanket trait instead.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Raw get. `Ok(None)` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Raw put, overwriting any existing value.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Delete a key. Not an error if it was already absent.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List every key starting with `prefix`, e.g. `resource:` for all resources.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// JSON read/write helpers layered over any [`DocumentStore`].
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    /// Deserialize the value at `key` as JSON.
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Serialize `value` as JSON and store it at `key`.
    async fn put_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put(key, bytes).await
    }
}

impl<T: DocumentStore + ?Sized> DocumentStoreExt for T {}

/// Document store backend selection, mirroring the vector store provider pattern.
#[derive(Debug, Clone, Default)]
pub enum DocumentStoreProvider {
    /// Ephemeral in-process store, lost on restart.
    #[default]
    Memory,
    /// JSON-file-per-key store rooted at `path`.
    File {
        /// Root directory; created if missing.
        path: PathBuf,
    },
}

impl DocumentStoreProvider {
    /// Instantiate the configured backend.
    pub fn create_store(&self) -> Result<Arc<dyn DocumentStore>> {
        match self {
            DocumentStoreProvider::Memory => Ok(Arc::new(InMemoryDocumentStore::new())),
            DocumentStoreProvider::File { path } => {
                Ok(Arc::new(FileDocumentStore::new(path.clone())?))
            }
        }
    }

    /// Read `DOCUMENT_STORE_URI` from the environment: a `file://` URI selects
    /// [`DocumentStoreProvider::File`], anything else (including unset) falls back to memory.
    pub fn from_env() -> Self {
        match std::env::var("DOCUMENT_STORE_URI") {
            Ok(uri) if uri.starts_with("file://") => DocumentStoreProvider::File {
                path: PathBuf::from(uri.trim_start_matches("file://")),
            },
            _ => DocumentStoreProvider::Memory,
        }
    }
}

/// In-memory document store backed by a lock-guarded hash map.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.write().remove(key);
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .data
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Document store that persists each key as its own JSON-compatible file under
/// `root`, with `/` in the key mapped to `_` so namespaced keys stay flat.
#[derive(Debug)]
pub struct FileDocumentStore {
    root: PathBuf,
}

impl FileDocumentStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .map_err(|e| AppError::Configuration(format!("cannot create {}: {e}", root.display())))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe = key.replace(['/', ':'], "_");
        self.root.join(format!("{safe}.bin"))
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        tokio::fs::write(self.path_for(key), value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let safe_prefix = prefix.replace(['/', ':'], "_");
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".bin") {
                    if stem.starts_with(&safe_prefix) {
                        out.push(stem.to_string());
                    }
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_roundtrip() {
        let store = InMemoryDocumentStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
        store.put("a", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"hello".to_vec()));
        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn in_memory_list_prefix() {
        let store = InMemoryDocumentStore::new();
        store.put("resource:1", vec![]).await.unwrap();
        store.put("resource:2", vec![]).await.unwrap();
        store.put("collection:1", vec![]).await.unwrap();
        let mut keys = store.list_prefix("resource:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["resource:1".to_string(), "resource:2".to_string()]);
    }

    #[tokio::test]
    async fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDocumentStore::new(dir.path().to_path_buf()).unwrap();
        store.put("adapter:c1", b"{}".to_vec()).await.unwrap();
        assert_eq!(store.get("adapter:c1").await.unwrap(), Some(b"{}".to_vec()));
        let keys = store.list_prefix("adapter:").await.unwrap();
        assert_eq!(keys, vec!["adapter:c1".to_string()]);
    }
}

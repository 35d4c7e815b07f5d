use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use log::warn;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Malformed store file: {0}")]
    Malformed(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// String-keyed persistence for signature records.
#[async_trait]
pub trait StringStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Overwrites any existing value.
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Idempotent.
    async fn remove_item(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local store. Data is lost on drop.
#[derive(Default)]
pub struct InMemoryStringStore {
    items: RwLock<HashMap<String, String>>,
}

impl InMemoryStringStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .items
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl StringStore for InMemoryStringStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        Ok(items.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.items
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.items
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object file.
///
/// Every write rewrites the whole file through a sibling temp file and a
/// rename, so a crash never leaves a half-written map behind.
pub struct FileStringStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStringStore {
    /// Parent directories are created on first write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => {
                serde_json::from_str(&text).map_err(|e| StoreError::Malformed(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Map to rewrite on a write, and whether the file on disk was
    /// unreadable and has to be replaced.
    async fn read_map_for_write(&self) -> Result<(BTreeMap<String, String>, bool), StoreError> {
        match self.read_map().await {
            Ok(map) => Ok((map, false)),
            Err(StoreError::Malformed(reason)) => {
                warn!(
                    "Replacing unreadable store file {}: {reason}",
                    self.path.display()
                );
                Ok((BTreeMap::new(), true))
            }
            Err(e) => Err(e),
        }
    }

    async fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let text =
            serde_json::to_string_pretty(map).map_err(|e| StoreError::Malformed(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl StringStore for FileStringStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_map().await?.remove(key))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let (mut map, _) = self.read_map_for_write().await?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let (mut map, repaired) = self.read_map_for_write().await?;
        if map.remove(key).is_some() || repaired {
            self.write_map(&map).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryStringStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get_item("a").await.unwrap(), None);

        store.set_item("a", "1").await.unwrap();
        store.set_item("a", "2").await.unwrap();
        assert_eq!(store.get_item("a").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.len(), 1);

        store.remove_item("a").await.unwrap();
        store.remove_item("a").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("signatures.json");

        let store = FileStringStore::new(&path);
        assert_eq!(store.get_item("k").await.unwrap(), None);
        store.set_item("k", "{\"x\":1}").await.unwrap();
        store.set_item("other", "v").await.unwrap();

        let reopened = FileStringStore::new(&path);
        assert_eq!(
            reopened.get_item("k").await.unwrap().as_deref(),
            Some("{\"x\":1}")
        );

        reopened.remove_item("k").await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap(), None);
        assert_eq!(store.get_item("other").await.unwrap().as_deref(), Some("v"));
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("signatures.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileStringStore::new(&path);
        assert!(matches!(
            store.get_item("k").await,
            Err(StoreError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_file_store_write_replaces_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("signatures.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileStringStore::new(&path);
        store.set_item("k", "v").await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap().as_deref(), Some("v"));

        std::fs::write(&path, "{broken").unwrap();
        store.remove_item("k").await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap(), None);
    }
}

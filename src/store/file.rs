use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::KeyValueStore;
use crate::error::{DdasError, Result};

/// JSON-file backed store.
///
/// The whole document is kept in memory and rewritten on every mutation
/// (temp file + rename), so a crash never leaves a half-written store.
pub struct FileStore {
    /// Cached document, only replaced once the disk write succeeded; the
    /// lock is held across the write so mutations are persisted in order.
    entries: Mutex<BTreeMap<String, Value>>,

    /// Path to the store document
    path: PathBuf,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries = if path.exists() {
            let contents = tokio::fs::read_to_string(&path).await?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents).map_err(|e| {
                    DdasError::Store(format!("Corrupt store at {}: {}", path.display(), e))
                })?
            }
        } else {
            tracing::debug!("Store file not found at {:?}, starting empty", path);
            BTreeMap::new()
        };

        tracing::info!("Opened store at {:?} ({} keys)", path, entries.len());

        Ok(Self {
            entries: Mutex::new(entries),
            path,
        })
    }

    /// Get the store file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(entries)?;
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        tracing::trace!("Persisted store to {:?}", self.path);
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        next.insert(key.to_string(), value);
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .lock()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path().join("store.json"))
            .await
            .unwrap();

        assert!(store.keys_with_prefix("").await.unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("store.json");

        {
            let store = FileStore::open(&path).await.unwrap();
            store.set("authToken", json!("jwt")).await.unwrap();
            store.set("pending_1", json!({"id": "1"})).await.unwrap();
            store.set("pending_2", json!({"id": "2"})).await.unwrap();
            store.remove("pending_2").await.unwrap();
        }

        let reopened = FileStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("authToken").await.unwrap(), Some(json!("jwt")));
        assert_eq!(
            reopened.keys_with_prefix("pending_").await.unwrap(),
            vec!["pending_1".to_string()]
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_cache_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        let store = FileStore::open(&path).await.unwrap();
        store.set("pending_1", json!({"a": 1})).await.unwrap();

        // A directory in the temp file's place makes every write fail
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap();

        assert!(store.set("pending_1", json!({"a": 2})).await.is_err());
        assert!(store.set("pending_9", json!({"a": 9})).await.is_err());
        assert!(store.remove("pending_1").await.is_err());

        assert_eq!(store.get("pending_1").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(store.get("pending_9").await.unwrap(), None);
        assert_eq!(
            store.keys_with_prefix("pending_").await.unwrap(),
            vec!["pending_1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unwritable_location_keeps_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let store = FileStore::open(blocker.join("store.json")).await.unwrap();
        assert!(store.set("pending_9", json!({"a": 1})).await.is_err());
        assert_eq!(store.get("pending_9").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();

        let result = FileStore::open(&path).await;
        assert!(matches!(result, Err(DdasError::Store(_))));
    }
}

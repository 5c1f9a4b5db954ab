use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::KeyValueStore;
use crate::error::Result;

/// In-memory store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
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

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryStore::new();
        assert!(store.get("a").await.unwrap().is_none());

        store.set("a", json!({"x": 1})).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(json!({"x": 1})));

        store.remove("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());

        // Removing again is a no-op
        store.remove("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_with_prefix() {
        let store = MemoryStore::new();
        store.set("pending_2", json!(2)).await.unwrap();
        store.set("pending_1", json!(1)).await.unwrap();
        store.set("statusHistory", json!([])).await.unwrap();

        let keys = store.keys_with_prefix("pending_").await.unwrap();
        assert_eq!(keys, vec!["pending_1".to_string(), "pending_2".to_string()]);
        assert_eq!(store.len(), 3);
    }
}

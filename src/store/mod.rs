//! Persistent key-value store used for pending entries, history and the
//! credential record.
//!
//! Values are arbitrary JSON documents. Two backends are provided:
//! - `MemoryStore`: process-local map, used by tests and ephemeral runs
//! - `FileStore`: one JSON document on disk, rewritten atomically on every mutation

mod file;
mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Key holding the bounded history list.
pub const HISTORY_KEY: &str = "statusHistory";

/// Key holding the credential written by the authentication flow.
pub const AUTH_TOKEN_KEY: &str = "authToken";

/// Prefix for one record per pending entry.
pub const PENDING_PREFIX: &str = "pending_";

/// Build the store key for a pending entry id.
pub fn pending_key(id: &str) -> String {
    format!("{}{}", PENDING_PREFIX, id)
}

/// Durable mapping from string key to structured value.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Read a value, `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Insert or replace a value.
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// List all keys starting with `prefix`, sorted.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_key() {
        assert_eq!(pending_key("42"), "pending_42");
        assert!(pending_key("abc").starts_with(PENDING_PREFIX));
    }
}

//! Pending Registry: owns every `PendingEntry` for its whole lifetime.
//!
//! Entries are mirrored to the key-value store under `pending_<id>` so an
//! interrupted run can pick its queue back up. Every mutation is persisted
//! before it becomes visible in memory, and every visible mutation is
//! reported synchronously to the registered observers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use super::entry::{PendingEntry, PendingState, RetryState};
use crate::error::{DdasError, Result};
use crate::store::{pending_key, KeyValueStore, PENDING_PREFIX};

/// A single registry mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    Created { id: String },
    Updated { id: String, state: PendingState },
    Deleted { id: String },
}

/// Receives registry mutations as they happen.
///
/// Called while the registry is locked: implementations must not call
/// back into the registry.
pub trait RegistryObserver: Send + Sync {
    fn on_change(&self, change: &RegistryChange, count: usize);
}

pub struct PendingRegistry {
    /// Live entries by id; the lock is held across persistence so the
    /// store sees mutations in the same order as memory.
    entries: Mutex<HashMap<String, PendingEntry>>,

    /// Backing store
    store: Arc<dyn KeyValueStore>,

    observers: RwLock<Vec<Arc<dyn RegistryObserver>>>,
}

impl PendingRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            store,
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register an observer for all future mutations.
    pub fn subscribe(&self, observer: Arc<dyn RegistryObserver>) {
        self.observers.write().push(observer);
    }

    /// Reload persisted entries into memory.
    ///
    /// Records that fail to parse are dropped from the store. Returns the
    /// entries now held, oldest first.
    pub async fn load(&self) -> Result<Vec<PendingEntry>> {
        let mut entries = self.entries.lock().await;

        for key in self.store.keys_with_prefix(PENDING_PREFIX).await? {
            let Some(value) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_value::<PendingEntry>(value) {
                Ok(entry) => {
                    entries.insert(entry.id.clone(), entry);
                }
                Err(e) => {
                    tracing::warn!("Dropping unreadable pending record {}: {}", key, e);
                    self.store.remove(&key).await?;
                }
            }
        }

        tracing::info!("Loaded {} pending entries from store", entries.len());
        for entry in entries.values() {
            self.notify(
                &RegistryChange::Created {
                    id: entry.id.clone(),
                },
                entries.len(),
            );
        }

        let mut loaded: Vec<PendingEntry> = entries.values().cloned().collect();
        loaded.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(loaded)
    }

    /// Create a new entry in `AwaitingConsent`.
    ///
    /// Fails with `DuplicateId` if the id is already present; the existing
    /// entry is left untouched.
    pub async fn create(
        &self,
        id: &str,
        filename: &str,
        filepath: &str,
        credential: Option<String>,
    ) -> Result<PendingEntry> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(id) {
            return Err(DdasError::DuplicateId(id.to_string()));
        }

        let entry = PendingEntry::new(id, filename, filepath, credential);
        self.persist(&entry).await?;
        entries.insert(id.to_string(), entry.clone());

        tracing::debug!("Created pending entry {} ({})", id, filename);
        self.notify(&RegistryChange::Created { id: id.to_string() }, entries.len());
        Ok(entry)
    }

    /// Get an entry by id.
    pub async fn get(&self, id: &str) -> Result<PendingEntry> {
        self.entries
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DdasError::NotFound(id.to_string()))
    }

    /// Check whether an entry exists.
    pub async fn contains(&self, id: &str) -> bool {
        self.entries.lock().await.contains_key(id)
    }

    /// Move an entry to `new_state`, validating against the state machine.
    pub async fn transition(&self, id: &str, new_state: PendingState) -> Result<PendingEntry> {
        self.update(id, new_state, |entry| {
            if new_state != PendingState::RetryScheduled {
                entry.retry = None;
            }
        })
        .await
    }

    /// `Dispatching -> RetryScheduled`, recording the armed timer.
    pub async fn arm_retry(&self, id: &str, retry: RetryState) -> Result<PendingEntry> {
        self.update(id, PendingState::RetryScheduled, move |entry| {
            entry.retry = Some(retry);
        })
        .await
    }

    /// `RetryScheduled -> Dispatching`, counting the fired retry.
    pub async fn begin_retry(&self, id: &str) -> Result<PendingEntry> {
        self.update(id, PendingState::Dispatching, |entry| {
            entry.attempt += 1;
            entry.retry = None;
        })
        .await
    }

    /// Remove an entry. Absent ids are a no-op.
    ///
    /// Returns the removed entry, if there was one.
    pub async fn delete(&self, id: &str) -> Result<Option<PendingEntry>> {
        let mut entries = self.entries.lock().await;
        let Some(removed) = entries.remove(id) else {
            tracing::debug!("Delete of absent pending entry {} ignored", id);
            return Ok(None);
        };

        // The entry is gone from memory either way; a stale record is
        // cleaned up on the next load.
        if let Err(e) = self.store.remove(&pending_key(id)).await {
            tracing::error!("Failed to remove pending record {}: {}", id, e);
        }

        tracing::debug!("Deleted pending entry {}", id);
        self.notify(&RegistryChange::Deleted { id: id.to_string() }, entries.len());
        Ok(Some(removed))
    }

    /// All entries, oldest first.
    pub async fn list(&self) -> Vec<PendingEntry> {
        let mut all: Vec<PendingEntry> = self.entries.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }

    /// Number of live entries regardless of state.
    pub async fn count(&self) -> usize {
        self.entries.lock().await.len()
    }

    async fn update<F>(&self, id: &str, new_state: PendingState, apply: F) -> Result<PendingEntry>
    where
        F: FnOnce(&mut PendingEntry),
    {
        let mut entries = self.entries.lock().await;
        let current = entries
            .get(id)
            .ok_or_else(|| DdasError::NotFound(id.to_string()))?;

        if !current.state.can_transition_to(new_state) {
            return Err(DdasError::InvalidTransition {
                id: id.to_string(),
                from: current.state,
                to: new_state,
            });
        }

        let mut updated = current.clone();
        updated.state = new_state;
        apply(&mut updated);

        self.persist(&updated).await?;
        entries.insert(id.to_string(), updated.clone());

        tracing::debug!("Pending entry {} -> {}", id, new_state);
        self.notify(
            &RegistryChange::Updated {
                id: id.to_string(),
                state: new_state,
            },
            entries.len(),
        );
        Ok(updated)
    }

    async fn persist(&self, entry: &PendingEntry) -> Result<()> {
        let value = serde_json::to_value(entry)?;
        self.store.set(&pending_key(&entry.id), value).await
    }

    fn notify(&self, change: &RegistryChange, count: usize) {
        for observer in self.observers.read().iter() {
            observer.on_change(change, count);
        }
    }
}

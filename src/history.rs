//! History Log: bounded, most-recent-first record of terminal outcomes.
//!
//! The whole list is persisted under a single store key on every append.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::store::{KeyValueStore, HISTORY_KEY};

/// Default number of entries kept.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Final outcome recorded for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOutcome {
    Success,
    Duplicate,
    Error,
    Skipped,
}

impl std::fmt::Display for HistoryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryOutcome::Success => write!(f, "success"),
            HistoryOutcome::Duplicate => write!(f, "duplicate"),
            HistoryOutcome::Error => write!(f, "error"),
            HistoryOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

/// Immutable terminal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: HistoryOutcome,
    /// Name the file was first seen under (duplicates only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HistoryEntry {
    pub fn new(filename: impl Into<String>, outcome: HistoryOutcome) -> Self {
        Self {
            filename: filename.into(),
            timestamp: Utc::now(),
            outcome,
            original_filename: None,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_original_filename(mut self, original: impl Into<String>) -> Self {
        self.original_filename = Some(original.into());
        self
    }
}

pub struct HistoryLog {
    /// Most-recent-first; held across persistence so snapshots land in order
    entries: Mutex<Vec<HistoryEntry>>,
    store: Arc<dyn KeyValueStore>,
    limit: usize,
}

impl HistoryLog {
    /// Open the log, reading any persisted list.
    ///
    /// A persisted list longer than `limit` is truncated; an unreadable one
    /// is discarded.
    pub async fn open(store: Arc<dyn KeyValueStore>, limit: usize) -> Result<Self> {
        let limit = limit.max(1);
        let mut entries = match store.get(HISTORY_KEY).await? {
            Some(value) => serde_json::from_value::<Vec<HistoryEntry>>(value).unwrap_or_else(|e| {
                tracing::warn!("Discarding unreadable history: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        entries.truncate(limit);

        Ok(Self {
            entries: Mutex::new(entries),
            store,
            limit,
        })
    }

    /// Insert at the front, evicting the oldest entry once over the bound.
    ///
    /// A persistence failure is logged; the in-memory log still advances.
    pub async fn append(&self, entry: HistoryEntry) {
        let mut entries = self.entries.lock().await;
        entries.insert(0, entry);
        entries.truncate(self.limit);

        match serde_json::to_value(&*entries) {
            Ok(value) => {
                if let Err(e) = self.store.set(HISTORY_KEY, value).await {
                    tracing::error!("Failed to persist history: {}", e);
                }
            }
            Err(e) => tracing::error!("Failed to serialize history: {}", e),
        }
    }

    /// Current snapshot, most recent first.
    pub async fn list(&self) -> Vec<HistoryEntry> {
        self.entries.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use proptest::prelude::*;

    async fn log(limit: usize) -> (HistoryLog, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (HistoryLog::open(store.clone(), limit).await.unwrap(), store)
    }

    #[tokio::test]
    async fn test_append_is_most_recent_first() {
        let (history, _) = log(20).await;
        history
            .append(HistoryEntry::new("a.pdf", HistoryOutcome::Success))
            .await;
        history
            .append(HistoryEntry::new("b.zip", HistoryOutcome::Skipped))
            .await;

        let names: Vec<String> = history.list().await.into_iter().map(|e| e.filename).collect();
        assert_eq!(names, vec!["b.zip", "a.pdf"]);
    }

    #[tokio::test]
    async fn test_bound_evicts_oldest() {
        let (history, _) = log(3).await;
        for i in 0..5 {
            history
                .append(HistoryEntry::new(format!("f{}", i), HistoryOutcome::Success))
                .await;
        }

        let names: Vec<String> = history.list().await.into_iter().map(|e| e.filename).collect();
        assert_eq!(names, vec!["f4", "f3", "f2"]);
    }

    #[tokio::test]
    async fn test_persisted_snapshot_survives_reopen() {
        let (history, store) = log(20).await;
        history
            .append(
                HistoryEntry::new("b.zip", HistoryOutcome::Duplicate)
                    .with_original_filename("b_v1.zip"),
            )
            .await;

        let reopened = HistoryLog::open(store, 20).await.unwrap();
        let entries = reopened.list().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, HistoryOutcome::Duplicate);
        assert_eq!(entries[0].original_filename.as_deref(), Some("b_v1.zip"));
    }

    #[tokio::test]
    async fn test_open_truncates_oversized_list() {
        let store = Arc::new(MemoryStore::new());
        let list: Vec<HistoryEntry> = (0..10)
            .map(|i| HistoryEntry::new(format!("f{}", i), HistoryOutcome::Error))
            .collect();
        store
            .set(HISTORY_KEY, serde_json::to_value(&list).unwrap())
            .await
            .unwrap();

        let history = HistoryLog::open(store, 4).await.unwrap();
        assert_eq!(history.list().await.len(), 4);
        assert_eq!(history.list().await[0].filename, "f0");
    }

    #[test]
    fn test_outcome_wire_format() {
        let entry = HistoryEntry::new("x", HistoryOutcome::Skipped);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert!(json.get("original_filename").is_none());
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_bound_and_keeps_newest(limit in 1usize..30, appends in 0usize..80) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let (history, _) = log(limit).await;
                for i in 0..appends {
                    history
                        .append(HistoryEntry::new(i.to_string(), HistoryOutcome::Success))
                        .await;
                }

                let entries = history.list().await;
                prop_assert_eq!(entries.len(), appends.min(limit));
                // Newest first, contiguous, oldest evicted first
                for (pos, entry) in entries.iter().enumerate() {
                    prop_assert_eq!(entry.filename.clone(), (appends - 1 - pos).to_string());
                }
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}

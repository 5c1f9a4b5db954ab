// Presentation-layer seam.
//
// The orchestrator never talks to a UI directly. It emits plain data events
// through a `DdasRuntime` and asks it for consent decisions; the runtime
// decides how those reach a person (terminal, JSON lines, a GUI bridge).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::history::HistoryEntry;
use crate::pending::PendingEntry;

mod channel;

pub use channel::ChannelRuntime;

/// Runtime-specific errors
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to emit event: {0}")]
    EmitFailed(String),

    #[error("Event receiver closed")]
    ReceiverClosed,

    #[error("Consent request for {0} was cancelled")]
    ConsentCancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

/// The user's answer to a consent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Skip,
}

impl std::str::FromStr for Decision {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "accept" | "a" | "y" | "yes" => Ok(Decision::Accept),
            "skip" | "s" | "n" | "no" => Ok(Decision::Skip),
            other => Err(RuntimeError::Other(format!("Unknown decision: {}", other))),
        }
    }
}

/// Events delivered to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// Number of pending entries changed
    PendingCountChanged { count: usize },

    /// A file is waiting for an accept/skip decision
    ConsentRequested {
        id: String,
        filename: String,
        filepath: String,
        created_at: DateTime<Utc>,
    },

    /// A transient failure armed a retry timer
    RetryScheduled {
        id: String,
        attempt: u32,
        delay_ms: u64,
    },

    /// A terminal outcome was recorded
    HistoryAppended { entry: HistoryEntry },

    /// The heartbeat saw the processing service come or go
    ConnectivityChanged { connected: bool },
}

impl RuntimeEvent {
    /// Build a consent request without exposing the entry's credential.
    pub fn consent_requested(entry: &PendingEntry) -> Self {
        RuntimeEvent::ConsentRequested {
            id: entry.id.clone(),
            filename: entry.filename.clone(),
            filepath: entry.filepath.clone(),
            created_at: entry.created_at,
        }
    }
}

/// Runtime abstraction between the orchestrator and whatever presents it.
///
/// # Object Safety
/// This trait is object-safe and intended to be used as `Arc<dyn DdasRuntime>`.
#[async_trait]
pub trait DdasRuntime: Send + Sync + 'static {
    /// Emit an event to the presentation layer.
    ///
    /// # Errors
    /// Returns `RuntimeError::ReceiverClosed` if nobody is listening anymore.
    fn emit(&self, event: RuntimeEvent) -> Result<(), RuntimeError>;

    /// Ask the user to accept or skip a pending entry.
    ///
    /// Resolves only when a decision arrives; there is no timeout.
    async fn request_consent(&self, entry: &PendingEntry) -> Result<Decision, RuntimeError>;

    /// Abandon an outstanding consent request for `id`, if any.
    ///
    /// The waiting `request_consent` call resolves with
    /// `RuntimeError::ConsentCancelled`.
    fn withdraw_consent(&self, _id: &str) {}

    /// Check if every consent request is accepted without asking
    fn auto_accept(&self) -> bool;

    /// Graceful shutdown: outstanding consent requests are cancelled.
    async fn shutdown(&self) -> Result<(), RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_parsing() {
        assert_eq!("accept".parse::<Decision>().unwrap(), Decision::Accept);
        assert_eq!(" Y ".parse::<Decision>().unwrap(), Decision::Accept);
        assert_eq!("skip".parse::<Decision>().unwrap(), Decision::Skip);
        assert_eq!("no".parse::<Decision>().unwrap(), Decision::Skip);
        assert!("maybe".parse::<Decision>().is_err());
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(RuntimeEvent::PendingCountChanged { count: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "pending_count_changed", "count": 2}));
    }

    #[test]
    fn test_consent_request_hides_credential() {
        let entry = PendingEntry::new("1", "a.pdf", "/tmp/a.pdf", Some("secret".into()));
        let json = serde_json::to_string(&RuntimeEvent::consent_requested(&entry)).unwrap();
        assert!(json.contains("consent_requested"));
        assert!(!json.contains("secret"));
    }
}

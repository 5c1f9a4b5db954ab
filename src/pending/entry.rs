//! Pending entry types and the lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingState {
    /// Waiting for the user to accept or skip
    AwaitingConsent,
    /// A dispatch to the processing service is in flight
    Dispatching,
    /// A transient failure armed a retry timer
    RetryScheduled,
    /// Resolved; the entry is about to be deleted
    Terminal,
}

impl PendingState {
    /// Check whether the state machine allows `self -> next`.
    ///
    /// There is no way back to `AwaitingConsent`, and `Terminal` is final.
    pub fn can_transition_to(self, next: PendingState) -> bool {
        use PendingState::*;
        matches!(
            (self, next),
            (AwaitingConsent, Dispatching)
                | (AwaitingConsent, Terminal)
                | (Dispatching, RetryScheduled)
                | (Dispatching, Terminal)
                | (RetryScheduled, Dispatching)
        )
    }
}

impl std::fmt::Display for PendingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PendingState::AwaitingConsent => write!(f, "awaiting_consent"),
            PendingState::Dispatching => write!(f, "dispatching"),
            PendingState::RetryScheduled => write!(f, "retry_scheduled"),
            PendingState::Terminal => write!(f, "terminal"),
        }
    }
}

/// Timer bookkeeping for an entry in `RetryScheduled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    /// The retry number this timer will fire (1-based)
    pub attempt: u32,
    /// When the timer is due
    pub next_fire_at: DateTime<Utc>,
}

/// One undecided or in-flight file event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    /// Identifier of the originating event (unique key)
    pub id: String,
    /// Display name
    pub filename: String,
    /// Reference the processing service can resolve
    pub filepath: String,
    /// Opaque token forwarded to the processing service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// When the file event was detected
    pub created_at: DateTime<Utc>,
    pub state: PendingState,
    /// Retries fired so far
    #[serde(default)]
    pub attempt: u32,
    /// Present only while `state == RetryScheduled`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryState>,
}

impl PendingEntry {
    /// Create a fresh entry awaiting consent.
    pub fn new(
        id: impl Into<String>,
        filename: impl Into<String>,
        filepath: impl Into<String>,
        credential: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            filepath: filepath.into(),
            credential,
            created_at: Utc::now(),
            state: PendingState::AwaitingConsent,
            attempt: 0,
            retry: None,
        }
    }

    /// Number of dispatches that have been made once the current one resolves.
    pub fn dispatches(&self) -> u32 {
        self.attempt + 1
    }
}

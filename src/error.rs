use serde::Serialize;
use thiserror::Error;

use crate::pending::PendingState;

#[derive(Debug, Error)]
pub enum DdasError {
    #[error("Pending entry already exists: {0}")]
    DuplicateId(String),

    #[error("Pending entry not found: {0}")]
    NotFound(String),

    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: PendingState,
        to: PendingState,
    },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DdasError {
    /// The entry moved on or went away before the work resumed.
    ///
    /// Anything else leaves the entry without a driver and must be
    /// resolved by the caller.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            DdasError::NotFound(_) | DdasError::InvalidTransition { .. }
        )
    }
}

// Presentation layers receive errors as plain strings
impl Serialize for DdasError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DdasError>;

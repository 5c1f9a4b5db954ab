//! DDAS: download duplicate alerts.
//!
//! Completed downloads come in as intake events. Each one waits for the
//! user's consent, is sent to a local processing service that decides
//! whether the content was seen before, is retried with linear backoff
//! while the service is unreachable, and ends as one record in a bounded
//! history.
//!
//! ```text
//! intake -> PendingRegistry -> ConsentBroker -> ProcessingClient -> HistoryLog
//!                 |                                  |  ^
//!                 v                                  v  |
//!           StatusPublisher                     RetryScheduler
//! ```

pub mod client;
pub mod consent;
pub mod error;
pub mod heartbeat;
pub mod history;
pub mod orchestrator;
pub mod pending;
pub mod retry;
pub mod runtime;
pub mod settings;
pub mod status;
pub mod store;

#[cfg(feature = "cli")]
pub mod cli;

pub use client::{ClientConfig, HttpProcessingClient, Outcome, ProcessingClient};
pub use error::{DdasError, Result};
pub use history::{HistoryEntry, HistoryLog, HistoryOutcome};
pub use orchestrator::{IntakeEvent, Orchestrator, OrchestratorConfig};
pub use pending::{PendingEntry, PendingRegistry, PendingState};
pub use retry::{RetryPolicy, RetryScheduler};
pub use runtime::{ChannelRuntime, DdasRuntime, Decision, RuntimeError, RuntimeEvent};
pub use settings::{DdasSettings, SettingsManager};
pub use store::{FileStore, KeyValueStore, MemoryStore};

//! Processing Client: request/response exchange with the processing service.
//!
//! The service owns hashing and duplicate matching; this side only forwards
//! a file reference and classifies what comes back.
//!
//! ```text
//! dispatch(entry)
//!   GET  /health   -- not 200 / no connection -> TransientFailure("unreachable")
//!   POST /process  {path, auth_token}
//!        -> Success | Duplicate | TransientFailure | TerminalFailure
//! ```

mod http;
pub mod protocol;

use async_trait::async_trait;

use crate::pending::PendingEntry;

pub use http::{ClientConfig, HttpProcessingClient};
pub use protocol::Outcome;

/// Seam between the orchestrator and the processing service.
#[async_trait]
pub trait ProcessingClient: Send + Sync + 'static {
    /// Lightweight liveness probe.
    async fn probe(&self) -> bool;

    /// Probe, then send the entry for processing and classify the result.
    ///
    /// Never fails: every problem is folded into the returned `Outcome`.
    async fn dispatch(&self, entry: &PendingEntry) -> Outcome;
}

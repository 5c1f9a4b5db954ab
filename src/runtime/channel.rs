use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};

use super::{DdasRuntime, Decision, RuntimeError, RuntimeEvent};
use crate::pending::PendingEntry;

/// Runtime that forwards events over a channel and parks consent requests
/// until `respond_to_consent` is called.
pub struct ChannelRuntime {
    event_tx: mpsc::UnboundedSender<RuntimeEvent>,
    pending_consents: Arc<RwLock<HashMap<String, oneshot::Sender<Decision>>>>,
    auto_accept: bool,
}

impl ChannelRuntime {
    /// Create a runtime and the receiver its events arrive on.
    pub fn new(auto_accept: bool) -> (Self, mpsc::UnboundedReceiver<RuntimeEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                event_tx,
                pending_consents: Arc::new(RwLock::new(HashMap::new())),
                auto_accept,
            },
            event_rx,
        )
    }

    /// Deliver the user's decision for `id`.
    ///
    /// Returns `false` if no consent request for that id is outstanding.
    pub fn respond_to_consent(&self, id: &str, decision: Decision) -> bool {
        match self.pending_consents.write().remove(id) {
            // Receiver gone means the request was abandoned; nothing to do
            Some(tx) => tx.send(decision).is_ok(),
            None => {
                tracing::warn!("No pending consent request for id: {}", id);
                false
            }
        }
    }

    /// Ids with a consent request still waiting for an answer.
    pub fn awaiting_consent(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pending_consents.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl DdasRuntime for ChannelRuntime {
    fn emit(&self, event: RuntimeEvent) -> Result<(), RuntimeError> {
        self.event_tx
            .send(event)
            .map_err(|_| RuntimeError::ReceiverClosed)
    }

    async fn request_consent(&self, entry: &PendingEntry) -> Result<Decision, RuntimeError> {
        if self.auto_accept {
            tracing::debug!("Auto-accepted {}", entry.filename);
            return Ok(Decision::Accept);
        }

        let (tx, rx) = oneshot::channel();

        // A repeated request for the same id supersedes the older one
        {
            self.pending_consents.write().insert(entry.id.clone(), tx);
        }

        if let Err(e) = self.emit(RuntimeEvent::consent_requested(entry)) {
            self.pending_consents.write().remove(&entry.id);
            return Err(e);
        }

        rx.await
            .map_err(|_| RuntimeError::ConsentCancelled(entry.id.clone()))
    }

    fn withdraw_consent(&self, id: &str) {
        if self.pending_consents.write().remove(id).is_some() {
            tracing::debug!("Withdrew consent request for {}", id);
        }
    }

    fn auto_accept(&self) -> bool {
        self.auto_accept
    }

    async fn shutdown(&self) -> Result<(), RuntimeError> {
        // Dropping the senders wakes every waiter with a cancellation
        let pending = std::mem::take(&mut *self.pending_consents.write());
        if !pending.is_empty() {
            tracing::debug!("Cancelled {} outstanding consent requests", pending.len());
        }
        Ok(())
    }
}

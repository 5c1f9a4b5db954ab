//! Consent Broker: obtains accept/skip for one pending entry.
//!
//! The broker never touches the registry; the orchestrator applies the
//! decision. A cancelled request (runtime shut down, prompt abandoned) is
//! reported as an error so the entry stays `AwaitingConsent` and can be
//! asked again after a restart.

use std::sync::Arc;

use crate::pending::PendingEntry;
use crate::runtime::{DdasRuntime, Decision, RuntimeError};

pub struct ConsentBroker {
    runtime: Arc<dyn DdasRuntime>,
}

impl ConsentBroker {
    pub fn new(runtime: Arc<dyn DdasRuntime>) -> Self {
        Self { runtime }
    }

    /// Ask for a decision on `entry`. Suspends until one arrives.
    pub async fn request_consent(&self, entry: &PendingEntry) -> Result<Decision, RuntimeError> {
        tracing::info!("Requesting consent for {} ({})", entry.filename, entry.id);

        let decision = self.runtime.request_consent(entry).await?;

        tracing::info!(
            "Consent for {}: {}",
            entry.id,
            match decision {
                Decision::Accept => "accepted",
                Decision::Skip => "skipped",
            }
        );
        Ok(decision)
    }

    /// Drop an outstanding request whose entry no longer exists.
    pub fn withdraw(&self, id: &str) {
        self.runtime.withdraw_consent(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ChannelRuntime, RuntimeEvent};

    #[tokio::test]
    async fn test_decision_is_passed_through() {
        let (runtime, mut events) = ChannelRuntime::new(false);
        let runtime = Arc::new(runtime);
        let broker = Arc::new(ConsentBroker::new(runtime.clone()));

        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker
                    .request_consent(&PendingEntry::new("8", "x.bin", "/x.bin", None))
                    .await
            })
        };

        assert!(matches!(
            events.recv().await,
            Some(RuntimeEvent::ConsentRequested { ref id, .. }) if id == "8"
        ));
        runtime.respond_to_consent("8", Decision::Accept);
        assert_eq!(waiter.await.unwrap().unwrap(), Decision::Accept);
    }

    #[tokio::test]
    async fn test_cancellation_is_an_error() {
        let (runtime, mut events) = ChannelRuntime::new(false);
        let runtime = Arc::new(runtime);
        let broker = Arc::new(ConsentBroker::new(runtime.clone()));

        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker
                    .request_consent(&PendingEntry::new("8", "x.bin", "/x.bin", None))
                    .await
            })
        };
        events.recv().await.unwrap();
        runtime.shutdown().await.unwrap();

        assert!(waiter.await.unwrap().is_err());
    }
}

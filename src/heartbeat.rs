//! Periodic health probe of the processing service.
//!
//! Keeps the orchestrator's connectivity flag fresh between dispatches and
//! tells the presentation layer when the service comes or goes. Dispatch
//! does its own probe, so a stale flag never blocks work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::client::ProcessingClient;
use crate::runtime::{DdasRuntime, RuntimeEvent};

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Last known reachability of the processing service.
#[derive(Debug, Clone, Default)]
pub struct Connectivity(Arc<AtomicBool>);

impl Connectivity {
    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Record a probe result. Returns `true` if the value flipped.
    pub fn set(&self, connected: bool) -> bool {
        self.0.swap(connected, Ordering::AcqRel) != connected
    }
}

/// Handle to a running heartbeat task.
pub struct Heartbeat {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    /// Start probing every `interval`. The first probe runs immediately.
    pub fn spawn(
        client: Arc<dyn ProcessingClient>,
        interval: Duration,
        connectivity: Connectivity,
        runtime: Arc<dyn DdasRuntime>,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            tracing::debug!("Heartbeat started ({:?})", interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let connected = client.probe().await;
                        if connectivity.set(connected) {
                            if connected {
                                tracing::info!("Processing service is reachable");
                            } else {
                                tracing::warn!("Processing service is unreachable");
                            }
                            if let Err(e) = runtime.emit(RuntimeEvent::ConnectivityChanged { connected }) {
                                tracing::debug!("Connectivity change not delivered: {}", e);
                            }
                        }
                    }
                }
            }
            tracing::debug!("Heartbeat stopped");
        });

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    /// Stop the task and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.handle.await {
            tracing::error!("Heartbeat task failed: {}", e);
        }
    }
}

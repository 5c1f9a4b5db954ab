//! Status Publisher: the observable pending count.
//!
//! Registered as a registry observer, so the count is recomputed inside
//! every mutation rather than polled.

use std::sync::Arc;

use tokio::sync::watch;

use crate::pending::{RegistryChange, RegistryObserver};
use crate::runtime::{DdasRuntime, RuntimeEvent};

pub struct StatusPublisher {
    count_tx: watch::Sender<usize>,
    runtime: Arc<dyn DdasRuntime>,
}

impl StatusPublisher {
    pub fn new(runtime: Arc<dyn DdasRuntime>) -> Self {
        let (count_tx, _) = watch::channel(0);
        Self { count_tx, runtime }
    }

    /// Current number of pending entries, regardless of state.
    pub fn count(&self) -> usize {
        *self.count_tx.borrow()
    }

    /// Watch the count; the receiver sees every distinct value.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    /// Push the current count to the presentation layer unconditionally.
    pub fn publish(&self) {
        let count = self.count();
        if let Err(e) = self.runtime.emit(RuntimeEvent::PendingCountChanged { count }) {
            tracing::debug!("Pending count not delivered: {}", e);
        }
    }
}

impl RegistryObserver for StatusPublisher {
    fn on_change(&self, _change: &RegistryChange, count: usize) {
        let changed = self.count_tx.send_if_modified(|current| {
            if *current == count {
                false
            } else {
                *current = count;
                true
            }
        });

        if changed {
            tracing::debug!("Pending count: {}", count);
            self.publish();
        }
    }
}

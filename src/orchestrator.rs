//! The orchestrator context: intake -> consent -> dispatch -> retry -> history.
//!
//! One `Orchestrator` owns every component and the connectivity flag. It is
//! cheap to clone; each pending entry is driven by its own task holding a
//! clone, so different ids progress independently while a single id is
//! only ever driven by one task at a time.
//!
//! Every resume point (consent resolved, response received, retry fired)
//! re-checks the registry. An entry that was deleted in the meantime makes
//! the resumed work a no-op.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::client::{Outcome, ProcessingClient};
use crate::consent::ConsentBroker;
use crate::error::{DdasError, Result};
use crate::heartbeat::{Connectivity, Heartbeat};
use crate::history::{HistoryEntry, HistoryLog, HistoryOutcome, DEFAULT_HISTORY_LIMIT};
use crate::pending::{PendingEntry, PendingRegistry, PendingState};
use crate::retry::{RetryPolicy, RetryScheduler, ScheduleResult};
use crate::runtime::{DdasRuntime, Decision, RuntimeEvent};
use crate::status::StatusPublisher;
use crate::store::{KeyValueStore, AUTH_TOKEN_KEY};

const UNKNOWN_FILENAME: &str = "Unknown file";

/// A file that is ready for a duplicate check.
///
/// Delivered at least once; a repeat for a live id is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeEvent {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
    pub filepath: String,
}

impl IntakeEvent {
    pub fn new(id: impl Into<String>, filepath: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filename: None,
            filepath: filepath.into(),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Display name: the given filename, else the last path component.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.filename.as_deref().map(str::trim) {
            if !name.is_empty() {
                return name.to_string();
            }
        }

        // Accept both separators; the path may come from another platform
        self.filepath
            .rsplit(['/', '\\'])
            .find(|segment| !segment.is_empty())
            .unwrap_or(UNKNOWN_FILENAME)
            .to_string()
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub retry: RetryPolicy,
    pub history_limit: usize,
    /// `None` disables the heartbeat
    pub heartbeat_interval: Option<Duration>,
    /// Credential used when the store has no `authToken` record
    pub auth_token: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            heartbeat_interval: Some(crate::heartbeat::DEFAULT_HEARTBEAT_INTERVAL),
            auth_token: None,
        }
    }
}

struct Inner {
    registry: Arc<PendingRegistry>,
    history: HistoryLog,
    consent: ConsentBroker,
    client: Arc<dyn ProcessingClient>,
    scheduler: RetryScheduler,
    status: Arc<StatusPublisher>,
    runtime: Arc<dyn DdasRuntime>,
    store: Arc<dyn KeyValueStore>,
    connectivity: Connectivity,
    heartbeat: Mutex<Option<Heartbeat>>,
    config: OrchestratorConfig,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Wire up all components over `store`.
    ///
    /// Reads the persisted history; pending entries are not touched until
    /// [`Orchestrator::start`].
    pub async fn new(
        config: OrchestratorConfig,
        store: Arc<dyn KeyValueStore>,
        client: Arc<dyn ProcessingClient>,
        runtime: Arc<dyn DdasRuntime>,
    ) -> Result<Self> {
        let registry = Arc::new(PendingRegistry::new(store.clone()));
        let status = Arc::new(StatusPublisher::new(runtime.clone()));
        registry.subscribe(status.clone());

        let history = HistoryLog::open(store.clone(), config.history_limit).await?;
        let scheduler = RetryScheduler::new(config.retry, registry.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                history,
                consent: ConsentBroker::new(runtime.clone()),
                client,
                scheduler,
                status,
                runtime,
                store,
                connectivity: Connectivity::default(),
                heartbeat: Mutex::new(None),
                config,
            }),
        })
    }

    /// Resume the persisted queue, start the heartbeat and publish the count.
    pub async fn start(&self) -> Result<()> {
        self.recover().await?;

        if let Some(interval) = self.inner.config.heartbeat_interval {
            let heartbeat = Heartbeat::spawn(
                self.inner.client.clone(),
                interval,
                self.inner.connectivity.clone(),
                self.inner.runtime.clone(),
            );
            if let Some(previous) = self.inner.heartbeat.lock().replace(heartbeat) {
                tracing::warn!("Orchestrator started twice; replacing heartbeat");
                tokio::spawn(previous.stop());
            }
        }

        self.inner.status.publish();
        tracing::info!(
            "Orchestrator started with {} pending entries",
            self.inner.status.count()
        );
        Ok(())
    }

    /// Accept an intake event.
    ///
    /// Returns the created entry, or `None` when an entry with the same id
    /// already exists (repeat delivery). Consent and dispatch continue on a
    /// background task.
    pub async fn intake(&self, event: IntakeEvent) -> Result<Option<PendingEntry>> {
        let filename = event.display_name();
        let credential = self.resolve_credential().await;

        let entry = match self
            .inner
            .registry
            .create(&event.id, &filename, &event.filepath, credential)
            .await
        {
            Ok(entry) => entry,
            Err(DdasError::DuplicateId(id)) => {
                tracing::debug!("Repeat intake for {} ignored", id);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        tracing::info!("Intake {} ({})", entry.filename, entry.id);
        tokio::spawn(self.clone().drive(entry.clone()));
        Ok(Some(entry))
    }

    /// Clear an entry in any state, recording it as skipped.
    ///
    /// Returns `false` if there was nothing to dismiss.
    pub async fn dismiss(&self, id: &str) -> Result<bool> {
        let Some(entry) = self.inner.registry.delete(id).await? else {
            tracing::debug!("Dismiss of unknown id {} ignored", id);
            return Ok(false);
        };

        self.inner.consent.withdraw(id);
        tracing::info!("Dismissed {} ({})", entry.filename, id);
        self.record(HistoryEntry::new(&entry.filename, HistoryOutcome::Skipped).with_message("dismissed"))
            .await;
        Ok(true)
    }

    /// Read the persisted queue without resuming any of it.
    pub async fn load_pending(&self) -> Result<Vec<PendingEntry>> {
        self.inner.registry.load().await
    }

    /// Pending entries, oldest first.
    pub async fn pending(&self) -> Vec<PendingEntry> {
        self.inner.registry.list().await
    }

    /// History, most recent first.
    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.inner.history.list().await
    }

    pub fn pending_count(&self) -> usize {
        self.inner.status.count()
    }

    pub fn status(&self) -> &StatusPublisher {
        &self.inner.status
    }

    /// Last connectivity seen by the heartbeat or an explicit probe.
    pub fn is_connected(&self) -> bool {
        self.inner.connectivity.is_connected()
    }

    /// Probe the processing service now and record the result.
    pub async fn probe(&self) -> bool {
        let connected = self.inner.client.probe().await;
        if self.inner.connectivity.set(connected) {
            self.emit(RuntimeEvent::ConnectivityChanged { connected });
        }
        connected
    }

    /// Stop the heartbeat and cancel outstanding consent requests.
    ///
    /// Pending entries stay persisted and resume on the next start.
    pub async fn shutdown(&self) {
        let heartbeat = self.inner.heartbeat.lock().take();
        if let Some(heartbeat) = heartbeat {
            heartbeat.stop().await;
        }
        if let Err(e) = self.inner.runtime.shutdown().await {
            tracing::warn!("Runtime shutdown failed: {}", e);
        }
        tracing::info!("Orchestrator stopped");
    }

    /// Credential for a new entry: the store record, then configuration.
    async fn resolve_credential(&self) -> Option<String> {
        match self.inner.store.get(AUTH_TOKEN_KEY).await {
            Ok(Some(serde_json::Value::String(token))) if !token.is_empty() => {
                return Some(token);
            }
            Ok(Some(other)) => {
                tracing::warn!("Ignoring non-string {} record: {}", AUTH_TOKEN_KEY, other);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to read {}: {}", AUTH_TOKEN_KEY, e),
        }
        self.inner.config.auth_token.clone()
    }

    /// Reload persisted entries and pick each one up where it stopped.
    async fn recover(&self) -> Result<()> {
        let loaded = self.inner.registry.load().await?;

        for entry in loaded {
            match entry.state {
                PendingState::AwaitingConsent => {
                    tracing::info!("Re-requesting consent for {}", entry.id);
                    tokio::spawn(self.clone().drive(entry));
                }
                PendingState::Dispatching => {
                    tracing::info!("Re-dispatching interrupted {}", entry.id);
                    tokio::spawn(self.dispatch(entry));
                }
                PendingState::RetryScheduled => {
                    let this = self.clone();
                    let id = entry.id.clone();
                    self.inner
                        .scheduler
                        .resume(&entry, move |fired| this.on_retry_fired(id, fired));
                }
                PendingState::Terminal => {
                    tracing::info!("Removing resolved leftover {}", entry.id);
                    self.inner.registry.delete(&entry.id).await?;
                }
            }
        }
        Ok(())
    }

    /// Consent, then dispatch, for an entry in `AwaitingConsent`.
    async fn drive(self, entry: PendingEntry) {
        let decision = match self.inner.consent.request_consent(&entry).await {
            Ok(decision) => decision,
            Err(e) => {
                if self.inner.registry.contains(&entry.id).await {
                    tracing::warn!("Consent for {} unresolved: {}", entry.id, e);
                } else {
                    tracing::debug!("Consent for {} withdrawn: {}", entry.id, e);
                }
                return;
            }
        };

        match decision {
            Decision::Skip => {
                self.finalize(
                    &entry,
                    HistoryEntry::new(&entry.filename, HistoryOutcome::Skipped).with_message("skipped"),
                )
                .await;
            }
            Decision::Accept => {
                match self
                    .inner
                    .registry
                    .transition(&entry.id, PendingState::Dispatching)
                    .await
                {
                    Ok(dispatching) => self.dispatch(dispatching).await,
                    Err(e) if e.is_stale() => {
                        tracing::debug!("Decision for {} discarded: {}", entry.id, e);
                    }
                    Err(e) => self.abandon(&entry.id, e).await,
                }
            }
        }
    }

    /// Send an entry in `Dispatching` and act on the outcome.
    ///
    /// Boxed because a transient failure schedules another call to itself.
    fn dispatch(&self, entry: PendingEntry) -> BoxFuture<'static, ()> {
        let this = self.clone();
        async move {
            let outcome = this.inner.client.dispatch(&entry).await;
            if outcome.is_transient() {
                tracing::warn!("Outcome for {}: {:?}", entry.id, outcome);
            } else {
                tracing::info!("Outcome for {}: {:?}", entry.id, outcome);
            }

            let filename = entry.filename.as_str();
            match outcome {
                Outcome::Success { message } => {
                    let mut record = HistoryEntry::new(filename, HistoryOutcome::Success);
                    record.message = message;
                    this.finalize(&entry, record).await;
                }
                Outcome::Duplicate {
                    original_filename,
                    message,
                } => {
                    let mut record = HistoryEntry::new(filename, HistoryOutcome::Duplicate)
                        .with_original_filename(original_filename);
                    record.message = message;
                    this.finalize(&entry, record).await;
                }
                Outcome::TerminalFailure { .. } => {
                    let text = outcome.failure_text().unwrap_or_default();
                    this.finalize(
                        &entry,
                        HistoryEntry::new(filename, HistoryOutcome::Error).with_message(text),
                    )
                    .await;
                }
                Outcome::TransientFailure { .. } => this.retry(&entry, &outcome).await,
            }
        }
        .boxed()
    }

    async fn retry(&self, entry: &PendingEntry, outcome: &Outcome) {
        let this = self.clone();
        let id = entry.id.clone();
        let scheduled = self
            .inner
            .scheduler
            .schedule(entry, move |fired| this.on_retry_fired(id, fired))
            .await;

        match scheduled {
            Ok(ScheduleResult::Armed { entry: armed, delay }) => {
                let attempt = armed.retry.as_ref().map_or(armed.attempt + 1, |r| r.attempt);
                self.emit(RuntimeEvent::RetryScheduled {
                    id: armed.id.clone(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                });
            }
            Ok(ScheduleResult::Exhausted { dispatches }) => {
                let text = outcome.failure_text().unwrap_or_default();
                self.finalize(
                    entry,
                    HistoryEntry::new(&entry.filename, HistoryOutcome::Error).with_message(format!(
                        "retry exhausted after {} attempts: {}",
                        dispatches, text
                    )),
                )
                .await;
            }
            Err(e) if e.is_stale() => {
                tracing::debug!("Retry for {} dropped: {}", entry.id, e);
            }
            Err(e) => self.abandon(&entry.id, e).await,
        }
    }

    fn on_retry_fired(&self, id: String, fired: Result<PendingEntry>) -> BoxFuture<'static, ()> {
        match fired {
            Ok(entry) => self.dispatch(entry),
            Err(e) => {
                let this = self.clone();
                async move { this.abandon(&id, e).await }.boxed()
            }
        }
    }

    /// Terminal exit: claim the entry, delete it, record the outcome.
    ///
    /// Only the caller that both claims and deletes the entry appends
    /// history, so racing resolutions of one id leave a single record.
    async fn finalize(&self, entry: &PendingEntry, record: HistoryEntry) {
        let registry = &self.inner.registry;

        match registry.transition(&entry.id, PendingState::Terminal).await {
            Ok(_) => {}
            Err(e) if e.is_stale() => {
                tracing::debug!("Outcome for {} discarded: {}", entry.id, e);
                return;
            }
            // The outcome is settled; the delete below still claims the entry
            Err(e) => tracing::error!("Failed to persist outcome for {}: {}", entry.id, e),
        }

        match registry.delete(&entry.id).await {
            Ok(Some(_)) => self.record(record).await,
            Ok(None) => tracing::debug!("{} removed before its outcome was recorded", entry.id),
            Err(e) => tracing::error!("Failed to delete {}: {}", entry.id, e),
        }
    }

    /// Resolve an entry whose next state could not be persisted.
    ///
    /// Nothing would drive it any further, so it leaves as an error.
    async fn abandon(&self, id: &str, error: DdasError) {
        tracing::error!("Giving up on {}: {}", id, error);
        match self.inner.registry.delete(id).await {
            Ok(Some(entry)) => {
                self.record(
                    HistoryEntry::new(&entry.filename, HistoryOutcome::Error)
                        .with_message(error.to_string()),
                )
                .await
            }
            Ok(None) => tracing::debug!("{} already resolved", id),
            Err(e) => tracing::error!("Failed to delete {}: {}", id, e),
        }
    }

    async fn record(&self, record: HistoryEntry) {
        tracing::info!("History: {} -> {}", record.filename, record.outcome);
        self.inner.history.append(record.clone()).await;
        self.emit(RuntimeEvent::HistoryAppended { entry: record });
    }

    fn emit(&self, event: RuntimeEvent) {
        if let Err(e) = self.inner.runtime.emit(event) {
            tracing::debug!("Event not delivered: {}", e);
        }
    }
}

//! Retry Scheduler: backoff timing for transient failures.
//!
//! Backoff is linear in the retry number: retry `n` waits `base_delay * n`.
//! Timers are never cancelled explicitly. When one fires it re-reads the
//! entry, and an entry that was deleted (or moved on) in the meantime turns
//! the fire into a no-op.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::{DdasError, Result};
use crate::pending::{PendingEntry, PendingRegistry, RetryState};

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    /// Total dispatches allowed per entry
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry)
    }

    /// Retry number to arm after `entry`'s current dispatch failed
    /// transiently, or `None` once the dispatch budget is spent.
    pub fn next_retry(&self, entry: &PendingEntry) -> Option<u32> {
        let failed = entry.dispatches();
        (failed < self.max_attempts).then_some(failed)
    }
}

/// Result of asking the scheduler to retry an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleResult {
    Armed {
        entry: PendingEntry,
        delay: Duration,
    },
    /// No retries left; the caller finalizes the entry as an error
    Exhausted { dispatches: u32 },
}

pub struct RetryScheduler {
    policy: RetryPolicy,
    registry: Arc<PendingRegistry>,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy, registry: Arc<PendingRegistry>) -> Self {
        Self { policy, registry }
    }

    /// Arm a retry for an entry whose dispatch just failed transiently.
    ///
    /// Moves the entry `Dispatching -> RetryScheduled` and starts a one-shot
    /// timer. When the timer fires and the entry is still waiting, the
    /// attempt counter is bumped, the entry goes back to `Dispatching`, and
    /// `on_fire` runs with the updated entry. If that update cannot be
    /// persisted, `on_fire` gets the error instead so the caller can resolve
    /// the entry.
    pub async fn schedule<F, Fut>(&self, entry: &PendingEntry, on_fire: F) -> Result<ScheduleResult>
    where
        F: FnOnce(Result<PendingEntry>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Some(retry) = self.policy.next_retry(entry) else {
            tracing::info!(
                "Retries exhausted for {} after {} dispatches",
                entry.id,
                entry.dispatches()
            );
            return Ok(ScheduleResult::Exhausted {
                dispatches: entry.dispatches(),
            });
        };

        let delay = self.policy.delay_for(retry);
        let next_fire_at = Utc::now()
            + chrono::Duration::from_std(delay)
                .map_err(|e| DdasError::Internal(format!("Retry delay out of range: {}", e)))?;

        let armed = self
            .registry
            .arm_retry(
                &entry.id,
                RetryState {
                    attempt: retry,
                    next_fire_at,
                },
            )
            .await?;

        tracing::info!(
            "Retry {}/{} for {} in {:?}",
            retry,
            self.policy.max_attempts - 1,
            entry.id,
            delay
        );
        self.spawn_timer(armed.id.clone(), delay, on_fire);

        Ok(ScheduleResult::Armed {
            entry: armed,
            delay,
        })
    }

    /// Re-arm the timer of an entry reloaded in `RetryScheduled`.
    ///
    /// Fires immediately if the recorded fire time has already passed.
    pub fn resume<F, Fut>(&self, entry: &PendingEntry, on_fire: F) -> Duration
    where
        F: FnOnce(Result<PendingEntry>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = match &entry.retry {
            Some(retry) => (retry.next_fire_at - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO),
            None => self.policy.delay_for(entry.dispatches()),
        };

        tracing::info!("Resuming retry timer for {} in {:?}", entry.id, delay);
        self.spawn_timer(entry.id.clone(), delay, on_fire);
        delay
    }

    fn spawn_timer<F, Fut>(&self, id: String, delay: Duration, on_fire: F)
    where
        F: FnOnce(Result<PendingEntry>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let registry = self.registry.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            match registry.begin_retry(&id).await {
                Ok(entry) => {
                    tracing::debug!("Retry timer fired for {} (attempt {})", id, entry.attempt);
                    on_fire(Ok(entry)).await;
                }
                Err(DdasError::NotFound(_)) => {
                    tracing::debug!("Retry timer for {} fired after deletion; ignored", id);
                }
                Err(DdasError::InvalidTransition { from, .. }) => {
                    tracing::debug!("Retry timer for {} fired in state {}; ignored", id, from);
                }
                Err(e) => {
                    tracing::error!("Retry timer for {} failed: {}", id, e);
                    on_fire(Err(e)).await;
                }
            }
        });
    }
}

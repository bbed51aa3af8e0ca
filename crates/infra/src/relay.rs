//! Outbox relay.
//!
//! One relay per module drains that module's outbox to the external bus:
//!
//! ```text
//! Idle --tick--> try_acquire("outbox:<module>")
//!                  |-- held elsewhere --> Idle (debug log, no work)
//!                  '-- acquired --> select --> publish (sequential) --> save results --> release --> Idle
//! ```
//!
//! - Selection: up to `batch_size` unprocessed rows with
//!   `attempt_count < max_attempts`, oldest `occurred_at` first.
//! - Each row is decoded through the [`EventRegistry`] and published. Success
//!   marks it processed; a decode or publish failure marks it failed (error
//!   recorded, attempt counted) and the batch moves on.
//! - A publish cancelled by the bus stops the batch. During shutdown the row
//!   is left untouched; otherwise the cancellation counts as a failed attempt.
//! - All row changes of the iteration are saved together at the end.
//!
//! Delivery is at-least-once: a crash between publishing and saving results
//! republishes those rows on the next iteration.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use peoplehub_core::ModuleName;
use peoplehub_events::{BusError, EventBus, EventEnvelope, EventRegistry};

use crate::config::RelayConfig;
use crate::lock::{AdvisoryLock, LockError};
use crate::outbox::OutboxMessage;
use crate::store::{OutboxStore, StoreError};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one relay iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Another session holds the module lock.
    Skipped,
    Completed(BatchSummary),
}

/// What happened to the rows of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub selected: usize,
    pub published: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    /// Rows left untouched because the batch was interrupted.
    pub abandoned: usize,
}

/// Relay runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub iterations: u64,
    pub skipped: u64,
    pub published: u64,
    pub failed: u64,
    pub dead_lettered: u64,
    pub errors: u64,
}

enum Delivery {
    Published,
    Failed,
    /// The bus gave up on the publish. `counted` is false during shutdown,
    /// when the row is left untouched.
    Cancelled { counted: bool },
}

/// Background publisher for one module's outbox.
pub struct OutboxRelay<S, L, B> {
    module: ModuleName,
    store: S,
    lock: L,
    bus: B,
    registry: Arc<EventRegistry>,
    config: RelayConfig,
    stats: Arc<Mutex<RelayStats>>,
}

impl<S, L, B> OutboxRelay<S, L, B>
where
    S: OutboxStore,
    L: AdvisoryLock,
    B: EventBus,
{
    pub fn new(
        module: ModuleName,
        store: S,
        lock: L,
        bus: B,
        registry: Arc<EventRegistry>,
        config: RelayConfig,
    ) -> Self {
        Self {
            module,
            store,
            lock,
            bus,
            registry,
            config,
            stats: Arc::new(Mutex::new(RelayStats::default())),
        }
    }

    pub fn module(&self) -> &ModuleName {
        &self.module
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn stats(&self) -> RelayStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Run iterations on the poll interval until `cancel` fires.
    ///
    /// Iteration errors are logged and counted; they never stop the loop.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            module = %self.module,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            max_attempts = self.config.max_attempts,
            "outbox relay started"
        );

        let period = self.config.poll_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once(&cancel).await {
                        error!(module = %self.module, error = %err, "outbox relay iteration failed");
                        self.record(|s| s.errors += 1);
                    }
                }
            }
        }

        info!(module = %self.module, "outbox relay stopped");
    }

    /// One iteration: lock, select, publish, save, release.
    #[instrument(skip_all, fields(module = %self.module))]
    pub async fn run_once(
        &self,
        cancel: &CancellationToken,
    ) -> Result<IterationOutcome, RelayError> {
        let resource = self.module.lock_resource();
        if !self.lock.try_acquire(&resource).await? {
            debug!(resource = %resource, "outbox lock held elsewhere; skipping iteration");
            self.record(|s| s.skipped += 1);
            return Ok(IterationOutcome::Skipped);
        }

        let result = self.process_batch(cancel).await;

        if let Err(err) = self.lock.release(&resource).await {
            warn!(resource = %resource, error = %err, "failed to release outbox lock");
        }

        let summary = result?;
        self.record(|s| {
            s.iterations += 1;
            s.published += summary.published as u64;
            s.failed += summary.failed as u64;
            s.dead_lettered += summary.dead_lettered as u64;
        });
        Ok(IterationOutcome::Completed(summary))
    }

    async fn process_batch(&self, cancel: &CancellationToken) -> Result<BatchSummary, RelayError> {
        let messages = self
            .store
            .fetch_eligible(&self.module, self.config.batch_size, self.config.max_attempts)
            .await?;

        let mut summary = BatchSummary {
            selected: messages.len(),
            ..BatchSummary::default()
        };
        if messages.is_empty() {
            return Ok(summary);
        }

        let total = messages.len();
        let mut touched = Vec::with_capacity(total);
        for (index, mut message) in messages.into_iter().enumerate() {
            if cancel.is_cancelled() {
                summary.abandoned += total - index;
                break;
            }

            match self.deliver(&mut message, cancel).await {
                Delivery::Published => {
                    summary.published += 1;
                    touched.push(message);
                }
                Delivery::Failed => {
                    self.count_failure(&mut summary, &message);
                    touched.push(message);
                }
                Delivery::Cancelled { counted } => {
                    let untouched = total - index - 1;
                    if counted {
                        self.count_failure(&mut summary, &message);
                        touched.push(message);
                    } else {
                        summary.abandoned += 1;
                    }
                    summary.abandoned += untouched;
                    break;
                }
            }
        }

        self.store.save_results(&touched).await?;
        debug!(
            selected = summary.selected,
            published = summary.published,
            failed = summary.failed,
            "outbox batch saved"
        );
        Ok(summary)
    }

    async fn deliver(&self, message: &mut OutboxMessage, cancel: &CancellationToken) -> Delivery {
        let event = match self.registry.decode(&message.message_type, &message.content) {
            Ok(event) => event,
            Err(err) => {
                message.mark_failed(err.to_string());
                warn!(
                    message_id = %message.id,
                    message_type = %message.message_type,
                    attempt_count = message.attempt_count,
                    error = %err,
                    "outbox message could not be decoded"
                );
                return Delivery::Failed;
            }
        };

        let envelope = EventEnvelope::new(message.id, message.module.clone(), message.occurred_at, event);

        match self.bus.publish(&envelope, cancel).await {
            Ok(()) => {
                message.mark_processed(Utc::now());
                debug!(message_id = %message.id, event_type = envelope.event_type(), "outbox message published");
                Delivery::Published
            }
            Err(BusError::Cancelled) if cancel.is_cancelled() => {
                debug!(message_id = %message.id, "publish abandoned on shutdown");
                Delivery::Cancelled { counted: false }
            }
            Err(BusError::Cancelled) => {
                message.mark_failed(BusError::Cancelled.to_string());
                warn!(
                    message_id = %message.id,
                    message_type = %message.message_type,
                    attempt_count = message.attempt_count,
                    "bus cancelled the publish; stopping batch"
                );
                Delivery::Cancelled { counted: true }
            }
            Err(err) => {
                message.mark_failed(err.to_string());
                warn!(
                    message_id = %message.id,
                    message_type = %message.message_type,
                    attempt_count = message.attempt_count,
                    error = %err,
                    "outbox message publish failed"
                );
                Delivery::Failed
            }
        }
    }

    fn count_failure(&self, summary: &mut BatchSummary, message: &OutboxMessage) {
        summary.failed += 1;
        if message.is_dead_letter(self.config.max_attempts) {
            summary.dead_lettered += 1;
            warn!(
                message_id = %message.id,
                message_type = %message.message_type,
                attempt_count = message.attempt_count,
                dead_letter = true,
                "outbox message dead-lettered"
            );
        }
    }

    fn record(&self, update: impl FnOnce(&mut RelayStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        }
    }
}

impl<S, L, B> OutboxRelay<S, L, B>
where
    S: OutboxStore + 'static,
    L: AdvisoryLock + 'static,
    B: EventBus + 'static,
{
    /// Run the relay loop on its own tokio task.
    pub fn spawn(self, cancel: CancellationToken) -> RelayHandle {
        let stats = Arc::clone(&self.stats);
        let module = self.module.clone();
        let token = cancel.clone();
        let join = tokio::spawn(async move { self.run(token).await });
        RelayHandle {
            module,
            cancel,
            join,
            stats,
        }
    }
}

/// Handle to control a running relay.
#[derive(Debug)]
pub struct RelayHandle {
    module: ModuleName,
    cancel: CancellationToken,
    join: JoinHandle<()>,
    stats: Arc<Mutex<RelayStats>>,
}

impl RelayHandle {
    pub fn module(&self) -> &ModuleName {
        &self.module
    }

    /// Get current relay statistics.
    pub fn stats(&self) -> RelayStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Request shutdown and wait for the loop to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.join.await {
            error!(module = %self.module, error = %err, "outbox relay task panicked");
        }
    }
}

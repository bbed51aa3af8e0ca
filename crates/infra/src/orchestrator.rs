//! Commit orchestrator.
//!
//! Turns a [`UnitOfWork`] into one atomic write:
//!
//! 1. **Dispatch**: every buffered domain event, across all tracked aggregates,
//!    is handed to its local handlers in raise order. Handlers may enqueue
//!    outbox messages, track or mutate aggregates and raise new events; new
//!    events join the work-list and are dispatched in the same commit.
//! 2. **Persist**: dirty aggregate states and queued outbox messages go to the
//!    [`DurableStore`] in one batch.
//! 3. **Clear**: only after the write succeeded are the event buffers cleared.
//!
//! Any handler or store error leaves storage untouched and restores the unit of
//! work to how it was before `commit()` (events raised by the caller stay
//! buffered, so the commit can be retried).

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use peoplehub_core::AggregateId;
use peoplehub_events::{EventDispatcher, HandlerError};

use crate::store::{DurableStore, StoreError};
use crate::unit_of_work::{Aggregate, UnitOfWork};

/// Upper bound on events dispatched by one commit.
///
/// Handlers that keep raising events for each other would otherwise never
/// converge.
pub const MAX_DISPATCHED_EVENTS: usize = 10_000;

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("handler for '{event_type}' failed: {source}")]
    Handler {
        event_type: &'static str,
        #[source]
        source: HandlerError,
    },

    #[error("failed to serialize aggregate state: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("dispatch did not settle after {0} events")]
    DispatchLimit(usize),
}

/// Dispatches, persists and clears one unit of work at a time.
pub struct CommitOrchestrator<S> {
    store: S,
    dispatcher: Arc<EventDispatcher<UnitOfWork>>,
}

impl<S> CommitOrchestrator<S>
where
    S: DurableStore,
{
    pub fn new(store: S, dispatcher: Arc<EventDispatcher<UnitOfWork>>) -> Self {
        Self { store, dispatcher }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load a persisted aggregate into `uow`.
    ///
    /// Returns `None` when nothing is stored under `id`. An aggregate that is
    /// already tracked is returned as-is without touching storage.
    pub async fn load<'u, A: Aggregate>(
        &self,
        uow: &'u mut UnitOfWork,
        id: AggregateId,
    ) -> Result<Option<&'u mut A>, CommitError> {
        if !uow.is_tracked::<A>(id) {
            let Some(stored) = self.store.load_state(A::AGGREGATE_TYPE, id).await? else {
                return Ok(None);
            };
            let aggregate: A = serde_json::from_value(stored.state)?;
            uow.attach(aggregate, stored.version)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
        }
        Ok(uow.get_mut::<A>(id))
    }

    /// Commit `uow` atomically; returns the number of records written.
    #[instrument(skip_all, fields(module = %uow.module()), err)]
    pub async fn commit(&self, uow: &mut UnitOfWork) -> Result<usize, CommitError> {
        if uow.is_idle() {
            debug!("nothing to commit");
            return Ok(0);
        }

        let checkpoint = uow.checkpoint();
        match self.dispatch_and_persist(uow).await {
            Ok(written) => {
                uow.complete();
                debug!(written, "unit of work committed");
                Ok(written)
            }
            Err(err) => {
                uow.rollback(checkpoint);
                warn!(error = %err, "unit of work rolled back");
                Err(err)
            }
        }
    }

    async fn dispatch_and_persist(&self, uow: &mut UnitOfWork) -> Result<usize, CommitError> {
        let dispatched = self.dispatch_all(uow)?;
        let batch = uow.to_batch()?;
        debug!(
            dispatched,
            states = batch.states.len(),
            messages = batch.messages.len(),
            "persisting unit of work"
        );
        Ok(self.store.commit(batch).await?)
    }

    /// Drain the work-list: keep dispatching until no undispatched event is left.
    fn dispatch_all(&self, uow: &mut UnitOfWork) -> Result<usize, CommitError> {
        let mut dispatched = HashSet::new();
        loop {
            let round = uow.undispatched(&dispatched);
            if round.is_empty() {
                return Ok(dispatched.len());
            }

            for pending in round {
                if dispatched.len() >= MAX_DISPATCHED_EVENTS {
                    return Err(CommitError::DispatchLimit(dispatched.len()));
                }
                dispatched.insert(pending.sequence());
                self.dispatcher
                    .dispatch(pending.event(), uow)
                    .map_err(|source| CommitError::Handler {
                        event_type: pending.event_type(),
                        source,
                    })?;
            }
        }
    }
}

impl<S> core::fmt::Debug for CommitOrchestrator<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommitOrchestrator")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

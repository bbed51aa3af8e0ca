//! Unit of work.
//!
//! A [`UnitOfWork`] collects everything one business operation changes:
//! the aggregates it created or loaded, and the outbox messages queued for the
//! module. It is passed explicitly (`&mut`) to event handlers during commit,
//! which is how handlers enqueue messages and touch further aggregates.
//!
//! The unit of work is committed by the
//! [`CommitOrchestrator`](crate::orchestrator::CommitOrchestrator); it never
//! talks to storage itself.

use std::any::Any;
use std::collections::HashSet;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use peoplehub_core::{AggregateId, AggregateRoot, DomainError, DomainResult, ExpectedVersion, MessageId, ModuleName};
use peoplehub_events::{HasDomainEvents, IntegrationEvent, PendingEvent};

use crate::outbox::OutboxMessage;
use crate::store::{CommitBatch, StateChange};

/// What a type needs to take part in a unit of work.
///
/// Blanket-implemented; aggregates only implement [`AggregateRoot`],
/// [`HasDomainEvents`], `Clone` and serde.
pub trait Aggregate:
    AggregateRoot + HasDomainEvents + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> Aggregate for T where
    T: AggregateRoot + HasDomainEvents + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Type-erased view of a tracked aggregate.
trait Tracked: Send + Sync {
    fn aggregate_type(&self) -> &'static str;
    fn aggregate_id(&self) -> AggregateId;
    fn pending(&self) -> &[PendingEvent];
    fn clear_pending(&mut self);
    fn snapshot(&self) -> Box<dyn Tracked>;
    fn to_state(&self) -> Result<JsonValue, serde_json::Error>;
    fn as_any_ref(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<A: Aggregate> Tracked for A {
    fn aggregate_type(&self) -> &'static str {
        A::AGGREGATE_TYPE
    }

    fn aggregate_id(&self) -> AggregateId {
        AggregateRoot::id(self)
    }

    fn pending(&self) -> &[PendingEvent] {
        HasDomainEvents::events(self)
    }

    fn clear_pending(&mut self) {
        HasDomainEvents::clear_events(self);
    }

    fn snapshot(&self) -> Box<dyn Tracked> {
        Box::new(self.clone())
    }

    fn to_state(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn as_any_ref(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct Entry {
    aggregate: Box<dyn Tracked>,
    /// Persisted version the aggregate was loaded at (0 = new).
    version: u64,
    dirty: bool,
}

/// Copy of a unit of work taken before dispatch. Restoring it undoes every
/// effect of a failed commit, including handler changes to tracked aggregates.
pub(crate) struct Checkpoint {
    entries: Vec<(Box<dyn Tracked>, bool)>,
    messages: usize,
}

/// Pending changes of one business operation in one module.
pub struct UnitOfWork {
    module: ModuleName,
    entries: Vec<Entry>,
    outbox: Vec<OutboxMessage>,
}

impl UnitOfWork {
    pub fn new(module: ModuleName) -> Self {
        Self {
            module,
            entries: Vec::new(),
            outbox: Vec::new(),
        }
    }

    pub fn module(&self) -> &ModuleName {
        &self.module
    }

    /// Track a newly created aggregate.
    pub fn track<A: Aggregate>(&mut self, aggregate: A) -> DomainResult<()> {
        self.attach(aggregate, 0)
    }

    /// Track an aggregate loaded from storage at `version`.
    pub(crate) fn attach<A: Aggregate>(&mut self, aggregate: A, version: u64) -> DomainResult<()> {
        let id = AggregateRoot::id(&aggregate);
        if self.position(A::AGGREGATE_TYPE, id).is_some() {
            return Err(DomainError::conflict(format!(
                "{} {id} is already tracked by this unit of work",
                A::AGGREGATE_TYPE
            )));
        }
        self.entries.push(Entry {
            aggregate: Box::new(aggregate),
            version,
            dirty: true,
        });
        Ok(())
    }

    pub fn is_tracked<A: Aggregate>(&self, id: AggregateId) -> bool {
        self.position(A::AGGREGATE_TYPE, id).is_some()
    }

    pub fn get<A: Aggregate>(&self, id: AggregateId) -> Option<&A> {
        let index = self.position(A::AGGREGATE_TYPE, id)?;
        self.entries[index].aggregate.as_any_ref().downcast_ref::<A>()
    }

    /// Mutable access; marks the aggregate as changed.
    pub fn get_mut<A: Aggregate>(&mut self, id: AggregateId) -> Option<&mut A> {
        let index = self.position(A::AGGREGATE_TYPE, id)?;
        let entry = &mut self.entries[index];
        entry.dirty = true;
        entry.aggregate.as_any_mut().downcast_mut::<A>()
    }

    /// Persisted version of a tracked aggregate (0 when it was never stored).
    pub fn version_of<A: Aggregate>(&self, id: AggregateId) -> Option<u64> {
        self.position(A::AGGREGATE_TYPE, id)
            .map(|index| self.entries[index].version)
    }

    /// Queue a typed integration event on this module's outbox.
    pub fn enqueue<E: IntegrationEvent>(&mut self, event: &E) -> Result<MessageId, serde_json::Error> {
        let message = OutboxMessage::from_event(self.module.clone(), event)?;
        let id = message.id;
        self.outbox.push(message);
        Ok(id)
    }

    /// Queue a pre-built outbox message.
    pub fn enqueue_message(&mut self, message: OutboxMessage) {
        self.outbox.push(message);
    }

    pub fn queued_messages(&self) -> &[OutboxMessage] {
        &self.outbox
    }

    pub fn tracked_count(&self) -> usize {
        self.entries.len()
    }

    pub fn has_pending_events(&self) -> bool {
        self.entries.iter().any(|e| !e.aggregate.pending().is_empty())
    }

    /// Nothing to dispatch and nothing to write.
    pub fn is_idle(&self) -> bool {
        self.outbox.is_empty() && self.entries.iter().all(|e| !e.dirty && e.aggregate.pending().is_empty())
    }

    fn position(&self, aggregate_type: &str, id: AggregateId) -> Option<usize> {
        self.entries.iter().position(|e| {
            e.aggregate.aggregate_type() == aggregate_type && e.aggregate.aggregate_id() == id
        })
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            entries: self
                .entries
                .iter()
                .map(|e| (e.aggregate.snapshot(), e.dirty))
                .collect(),
            messages: self.outbox.len(),
        }
    }

    /// Buffered events not yet in `dispatched`, in raise order.
    pub(crate) fn undispatched(&self, dispatched: &HashSet<u64>) -> Vec<PendingEvent> {
        let mut events: Vec<PendingEvent> = self
            .entries
            .iter()
            .flat_map(|e| e.aggregate.pending().iter())
            .filter(|p| !dispatched.contains(&p.sequence()))
            .cloned()
            .collect();
        events.sort_by_key(PendingEvent::sequence);
        events
    }

    pub(crate) fn to_batch(&self) -> Result<CommitBatch, serde_json::Error> {
        let mut states = Vec::new();
        for entry in self.entries.iter().filter(|e| e.dirty) {
            states.push(StateChange {
                aggregate_type: entry.aggregate.aggregate_type().to_string(),
                aggregate_id: entry.aggregate.aggregate_id(),
                expected_version: ExpectedVersion::Exact(entry.version),
                state: entry.aggregate.to_state()?,
            });
        }
        Ok(CommitBatch {
            states,
            messages: self.outbox.clone(),
        })
    }

    /// Called once the batch is durable.
    pub(crate) fn complete(&mut self) {
        for entry in &mut self.entries {
            entry.aggregate.clear_pending();
            if entry.dirty {
                entry.version += 1;
                entry.dirty = false;
            }
        }
        self.outbox.clear();
    }

    /// Restore the unit of work to `checkpoint`. Events raised before the
    /// checkpoint stay buffered so a retry dispatches them again.
    pub(crate) fn rollback(&mut self, checkpoint: Checkpoint) {
        self.entries.truncate(checkpoint.entries.len());
        for (entry, (aggregate, dirty)) in self.entries.iter_mut().zip(checkpoint.entries) {
            entry.aggregate = aggregate;
            entry.dirty = dirty;
        }
        self.outbox.truncate(checkpoint.messages);
    }
}

impl core::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("module", &self.module)
            .field("tracked", &self.entries.len())
            .field("queued_messages", &self.outbox.len())
            .finish()
    }
}

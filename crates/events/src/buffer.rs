//! Pending-event buffer.
//!
//! Every aggregate owns an [`EventBuffer`]. Business methods append events; the
//! commit orchestrator reads them, dispatches them and clears the buffer only
//! after the unit of work has been persisted.
//!
//! Each appended event is stamped with a process-wide raise sequence, which
//! gives a total causal order across all aggregates of a unit of work.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::event::DomainEvent;

static RAISE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// A buffered domain event plus its raise sequence.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    sequence: u64,
    event: Arc<dyn DomainEvent>,
}

impl PendingEvent {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn event(&self) -> &dyn DomainEvent {
        self.event.as_ref()
    }

    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }
}

/// Append-only (until cleared) list of events raised by one aggregate.
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    pending: Vec<PendingEvent>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<E: DomainEvent>(&mut self, event: E) {
        let sequence = RAISE_SEQUENCE.fetch_add(1, Ordering::SeqCst);
        self.pending.push(PendingEvent {
            sequence,
            event: Arc::new(event),
        });
    }

    /// Events in append order.
    pub fn as_slice(&self) -> &[PendingEvent] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Implemented by aggregates that raise domain events.
///
/// Only `event_buffer`/`event_buffer_mut` need implementing; `clear_events` is
/// meant for the commit orchestrator and must not be called by business code.
pub trait HasDomainEvents {
    fn event_buffer(&self) -> &EventBuffer;

    fn event_buffer_mut(&mut self) -> &mut EventBuffer;

    fn add_event<E: DomainEvent>(&mut self, event: E)
    where
        Self: Sized,
    {
        self.event_buffer_mut().push(event);
    }

    fn events(&self) -> &[PendingEvent] {
        self.event_buffer().as_slice()
    }

    fn clear_events(&mut self) {
        self.event_buffer_mut().clear();
    }
}

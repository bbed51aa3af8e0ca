//! In-process domain event dispatch.
//!
//! Handlers are registered per concrete event type and invoked synchronously
//! with a mutable context (in practice the unit of work being committed), so a
//! handler can enqueue outbox messages, track further aggregates and raise
//! further events that the orchestrator will pick up in the same commit.
//!
//! ## Semantics
//!
//! - All handlers registered for an event's concrete type run, in
//!   registration order.
//! - The first handler error aborts dispatch of that event and is returned.
//! - Events without handlers are a no-op.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use peoplehub_core::DomainError;
use thiserror::Error;
use tracing::trace;

use crate::event::DomainEvent;

pub type HandlerResult = Result<(), HandlerError>;

/// Failure raised by a local event handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

type BoxedHandler<C> = Box<dyn Fn(&dyn DomainEvent, &mut C) -> HandlerResult + Send + Sync>;

/// Typed registry of domain event handlers over a context `C`.
pub struct EventDispatcher<C> {
    handlers: HashMap<TypeId, Vec<BoxedHandler<C>>>,
}

impl<C> EventDispatcher<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for events of concrete type `E`.
    pub fn on<E, F>(&mut self, handler: F) -> &mut Self
    where
        E: DomainEvent,
        F: Fn(&E, &mut C) -> HandlerResult + Send + Sync + 'static,
    {
        let boxed: BoxedHandler<C> = Box::new(move |event, ctx| match event.downcast_ref::<E>() {
            Some(typed) => handler(typed, ctx),
            None => Ok(()),
        });
        self.handlers.entry(TypeId::of::<E>()).or_default().push(boxed);
        self
    }

    pub fn handler_count<E: DomainEvent>(&self) -> usize {
        self.handlers.get(&TypeId::of::<E>()).map_or(0, Vec::len)
    }

    /// Run every handler registered for the event's concrete type.
    pub fn dispatch(&self, event: &dyn DomainEvent, ctx: &mut C) -> HandlerResult {
        let Some(handlers) = self.handlers.get(&event.as_any().type_id()) else {
            trace!(event_type = event.event_type(), "no handlers registered");
            return Ok(());
        };

        for handler in handlers {
            handler(event, ctx)?;
        }
        Ok(())
    }
}

impl<C> Default for EventDispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for EventDispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("event_types", &self.handlers.len())
            .field(
                "handlers",
                &self.handlers.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    #[derive(Debug)]
    struct LeaveRequested {
        days: u32,
    }

    impl DomainEvent for LeaveRequested {
        fn event_type(&self) -> &'static str {
            "test.leave.requested"
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    #[derive(Debug)]
    struct Unhandled;

    impl DomainEvent for Unhandled {
        fn event_type(&self) -> &'static str {
            "test.unhandled"
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    #[test]
    fn runs_all_handlers_in_registration_order() {
        let mut dispatcher = EventDispatcher::<Vec<String>>::new();
        dispatcher
            .on::<LeaveRequested, _>(|e, log| {
                log.push(format!("first:{}", e.days));
                Ok(())
            })
            .on::<LeaveRequested, _>(|e, log| {
                log.push(format!("second:{}", e.days));
                Ok(())
            });

        let mut log = Vec::new();
        dispatcher
            .dispatch(&LeaveRequested { days: 3 }, &mut log)
            .unwrap();

        assert_eq!(log, vec!["first:3", "second:3"]);
        assert_eq!(dispatcher.handler_count::<LeaveRequested>(), 2);
    }

    #[test]
    fn first_error_stops_dispatch() {
        let mut dispatcher = EventDispatcher::<Vec<&'static str>>::new();
        dispatcher
            .on::<LeaveRequested, _>(|_, _| Err(DomainError::invariant("no balance").into()))
            .on::<LeaveRequested, _>(|_, log| {
                log.push("unreachable");
                Ok(())
            });

        let mut log = Vec::new();
        let err = dispatcher
            .dispatch(&LeaveRequested { days: 1 }, &mut log)
            .unwrap_err();

        assert!(matches!(err, HandlerError::Domain(DomainError::InvariantViolation(_))));
        assert!(log.is_empty());
    }

    #[test]
    fn events_without_handlers_are_ignored() {
        let dispatcher = EventDispatcher::<()>::new();
        assert!(dispatcher.dispatch(&Unhandled, &mut ()).is_ok());
        assert_eq!(dispatcher.handler_count::<Unhandled>(), 0);
    }
}

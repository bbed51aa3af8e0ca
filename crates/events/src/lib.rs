//! Domain & integration events.
//!
//! - [`event`]: the domain event contract (facts raised by aggregates).
//! - [`buffer`]: per-aggregate pending-event buffer with a process-wide raise order.
//! - [`dispatch`]: synchronous, typed, in-process handler dispatch.
//! - [`integration`] / [`registry`]: events that leave the module and the
//!   explicit type-tag registry used to rebuild them from stored content.
//! - [`envelope`] / [`bus`]: what the relay hands to the external bus.

pub mod buffer;
pub mod bus;
pub mod dispatch;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod integration;
pub mod log_bus;
pub mod registry;

pub use buffer::{EventBuffer, HasDomainEvents, PendingEvent};
pub use bus::{BusError, EventBus, Subscription};
pub use dispatch::{EventDispatcher, HandlerError, HandlerResult};
pub use envelope::EventEnvelope;
pub use event::DomainEvent;
pub use in_memory_bus::InMemoryEventBus;
pub use integration::{AnyIntegrationEvent, IntegrationEvent};
pub use log_bus::LoggingEventBus;
pub use registry::{DecodeError, EventRegistry};

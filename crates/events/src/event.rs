use std::any::Any;

use chrono::{DateTime, Utc};

/// Upcast helper so trait objects can be downcast to their concrete type.
///
/// Implemented for every `'static` type; never implement it by hand.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A fact raised by an aggregate during a business operation.
///
/// Domain events are:
/// - **immutable** (treat them as facts)
/// - **local** (dispatched in-process within the unit of work, never persisted directly)
/// - owned by the aggregate's buffer until the commit that dispatches them succeeds
pub trait DomainEvent: AsAny + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "identity.account.registered").
    fn event_type(&self) -> &'static str;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}

impl dyn DomainEvent {
    pub fn is<E: DomainEvent>(&self) -> bool {
        self.as_any().is::<E>()
    }

    pub fn downcast_ref<E: DomainEvent>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }
}

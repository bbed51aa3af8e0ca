//! Integration events: the serialized facts a module publishes to other
//! modules through its outbox.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::event::AsAny;

/// A typed integration event.
///
/// `EVENT_TYPE` is the stable type tag stored in the outbox row and used by the
/// [`EventRegistry`](crate::registry::EventRegistry) to find the decoder. Renaming
/// it orphans already-stored rows, so treat it as part of the wire contract.
pub trait IntegrationEvent:
    Serialize + DeserializeOwned + core::fmt::Debug + Send + Sync + 'static
{
    const EVENT_TYPE: &'static str;

    /// When the originating domain fact happened.
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// Object-safe view over any [`IntegrationEvent`].
pub trait AnyIntegrationEvent: AsAny + core::fmt::Debug + Send + Sync + 'static {
    fn event_type(&self) -> &'static str;

    fn occurred_at(&self) -> DateTime<Utc>;

    fn to_json(&self) -> Result<JsonValue, serde_json::Error>;
}

impl<E: IntegrationEvent> AnyIntegrationEvent for E {
    fn event_type(&self) -> &'static str {
        E::EVENT_TYPE
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        IntegrationEvent::occurred_at(self)
    }

    fn to_json(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl dyn AnyIntegrationEvent {
    pub fn downcast_ref<E: IntegrationEvent>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }
}

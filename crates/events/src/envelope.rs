use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use peoplehub_core::{MessageId, ModuleName};

use crate::integration::AnyIntegrationEvent;

/// Envelope for a published integration event.
///
/// This is the unit the relay hands to the external bus.
///
/// Notes:
/// - `message_id` is the outbox row id; it is stable across redeliveries so
///   consumers can deduplicate (delivery is at-least-once).
/// - `module` is the publishing module's partition.
/// - `occurred_at` is the business time of the originating fact.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    message_id: MessageId,
    module: ModuleName,
    occurred_at: DateTime<Utc>,
    event: Arc<dyn AnyIntegrationEvent>,
}

impl EventEnvelope {
    pub fn new(
        message_id: MessageId,
        module: ModuleName,
        occurred_at: DateTime<Utc>,
        event: Arc<dyn AnyIntegrationEvent>,
    ) -> Self {
        Self {
            message_id,
            module,
            occurred_at,
            event,
        }
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn module(&self) -> &ModuleName {
        &self.module
    }

    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn event(&self) -> &dyn AnyIntegrationEvent {
        self.event.as_ref()
    }

    /// JSON form of the event body.
    pub fn payload(&self) -> Result<JsonValue, serde_json::Error> {
        self.event.to_json()
    }
}

//! Integration event type registry.
//!
//! The relay only has a type tag and a serialized payload for each outbox row.
//! Modules register every integration event type they emit at startup; the
//! registry maps the tag back to a typed decoder.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::integration::{AnyIntegrationEvent, IntegrationEvent};

type Decoder = fn(&str) -> Result<Arc<dyn AnyIntegrationEvent>, serde_json::Error>;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown event type '{0}'")]
    UnknownType(String),

    #[error("malformed content for event type '{event_type}': {source}")]
    Malformed {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    decoders: HashMap<&'static str, Decoder>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `E` under `E::EVENT_TYPE`. Registering twice is harmless.
    pub fn register<E: IntegrationEvent>(&mut self) -> &mut Self {
        self.decoders.insert(E::EVENT_TYPE, decode_as::<E>);
        self
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Rebuild an event from its stored type tag and content.
    pub fn decode(
        &self,
        event_type: &str,
        content: &str,
    ) -> Result<Arc<dyn AnyIntegrationEvent>, DecodeError> {
        let decoder = self
            .decoders
            .get(event_type)
            .ok_or_else(|| DecodeError::UnknownType(event_type.to_string()))?;

        decoder(content).map_err(|source| DecodeError::Malformed {
            event_type: event_type.to_string(),
            source,
        })
    }
}

fn decode_as<E: IntegrationEvent>(
    content: &str,
) -> Result<Arc<dyn AnyIntegrationEvent>, serde_json::Error> {
    let event: E = serde_json::from_str(content)?;
    Ok(Arc::new(event))
}

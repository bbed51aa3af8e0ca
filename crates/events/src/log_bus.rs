use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bus::{BusError, EventBus};
use crate::envelope::EventEnvelope;

/// Bus that only writes each envelope to the tracing output.
///
/// Used by the worker when no broker is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventBus;

#[async_trait]
impl EventBus for LoggingEventBus {
    async fn publish(
        &self,
        envelope: &EventEnvelope,
        cancel: &CancellationToken,
    ) -> Result<(), BusError> {
        if cancel.is_cancelled() {
            return Err(BusError::Cancelled);
        }

        let payload = envelope
            .payload()
            .map_err(|e| BusError::Rejected(e.to_string()))?;

        info!(
            message_id = %envelope.message_id(),
            module = %envelope.module(),
            event_type = envelope.event_type(),
            occurred_at = %envelope.occurred_at(),
            payload = %payload,
            "integration event published"
        );
        Ok(())
    }
}

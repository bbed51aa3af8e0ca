//! In-memory event bus for tests/dev.

use std::sync::{Mutex, mpsc};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusError, EventBus, Subscription};
use crate::envelope::EventEnvelope;

/// In-memory pub/sub bus.
///
/// - Records every published envelope (`published()`)
/// - Best-effort fan-out to subscribers
/// - Honors cancellation before publishing
#[derive(Debug, Default)]
pub struct InMemoryEventBus {
    subscribers: Mutex<Vec<mpsc::Sender<EventEnvelope>>>,
    published: Mutex<Vec<EventEnvelope>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription<EventEnvelope> {
        let (tx, rx) = mpsc::channel();

        // If the lock is poisoned, we still return a subscription;
        // it just won't receive messages.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        Subscription::new(rx)
    }

    /// Snapshot of everything published so far, in publish order.
    pub fn published(&self) -> Vec<EventEnvelope> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(
        &self,
        envelope: &EventEnvelope,
        cancel: &CancellationToken,
    ) -> Result<(), BusError> {
        if cancel.is_cancelled() {
            return Err(BusError::Cancelled);
        }

        self.published
            .lock()
            .map_err(|_| BusError::Unavailable("in-memory bus lock poisoned".into()))?
            .push(envelope.clone());

        let mut subs = self
            .subscribers
            .lock()
            .map_err(|_| BusError::Unavailable("in-memory bus lock poisoned".into()))?;

        // Drop any dead subscribers while publishing.
        subs.retain(|tx| tx.send(envelope.clone()).is_ok());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Utc};
    use peoplehub_core::{MessageId, ModuleName};
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::integration::IntegrationEvent;

    #[derive(Debug, Serialize, Deserialize)]
    struct Ping {
        occurred_at: DateTime<Utc>,
    }

    impl IntegrationEvent for Ping {
        const EVENT_TYPE: &'static str = "test.ping";

        fn occurred_at(&self) -> DateTime<Utc> {
            self.occurred_at
        }
    }

    fn envelope() -> EventEnvelope {
        let now = Utc::now();
        EventEnvelope::new(
            MessageId::new(),
            ModuleName::new("test").unwrap(),
            now,
            Arc::new(Ping { occurred_at: now }),
        )
    }

    #[tokio::test]
    async fn fans_out_to_subscribers_and_records() {
        let bus = InMemoryEventBus::new();
        let sub = bus.subscribe();
        let env = envelope();

        bus.publish(&env, &CancellationToken::new()).await.unwrap();

        let received = sub.drain();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].message_id(), env.message_id());
        assert_eq!(bus.published().len(), 1);
    }

    #[tokio::test]
    async fn refuses_to_publish_after_cancellation() {
        let bus = InMemoryEventBus::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = bus.publish(&envelope(), &cancel).await.unwrap_err();
        assert_eq!(err, BusError::Cancelled);
        assert!(bus.published().is_empty());
    }
}

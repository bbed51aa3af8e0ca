//! Redis Streams-backed event bus.
//!
//! Each published envelope becomes one `XADD` entry on a per-module stream
//! (`peoplehub:events:<module>`), with these fields:
//!
//! | field | value |
//! |-------|-------|
//! | `message_id` | outbox row id (consumers deduplicate on it) |
//! | `module` | publishing module |
//! | `event_type` | integration event type tag |
//! | `occurred_at` | RFC 3339 business time |
//! | `payload` | JSON event body |
//!
//! Consumer groups and acknowledgement are the consumers' business.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use peoplehub_events::{BusError, EventBus, EventEnvelope};

/// Default stream key prefix; the module name is appended.
const DEFAULT_STREAM_PREFIX: &str = "peoplehub:events:";

/// Default time budget for one `XADD`.
const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RedisStreamsEventBus {
    client: Arc<redis::Client>,
    stream_prefix: String,
    publish_timeout: Duration,
}

impl RedisStreamsEventBus {
    /// Create a new Redis Streams event bus.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `stream_prefix` - Stream key prefix (default: "peoplehub:events:")
    pub fn new(
        redis_url: impl AsRef<str>,
        stream_prefix: Option<String>,
    ) -> Result<Self, BusError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| BusError::Unavailable(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            stream_prefix: stream_prefix.unwrap_or_else(|| DEFAULT_STREAM_PREFIX.to_string()),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        })
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    fn stream_key(&self, envelope: &EventEnvelope) -> String {
        format!("{}{}", self.stream_prefix, envelope.module())
    }

    async fn xadd(&self, envelope: &EventEnvelope) -> Result<(), BusError> {
        let payload = envelope
            .payload()
            .map_err(|e| BusError::Rejected(e.to_string()))?;

        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))?;

        let _: String = redis::cmd("XADD")
            .arg(self.stream_key(envelope))
            .arg("*") // Auto-generate entry ID
            .arg("message_id")
            .arg(envelope.message_id().to_string())
            .arg("module")
            .arg(envelope.module().as_str())
            .arg("event_type")
            .arg(envelope.event_type())
            .arg("occurred_at")
            .arg(envelope.occurred_at().to_rfc3339())
            .arg("payload")
            .arg(payload.to_string())
            .query_async(&mut conn)
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl EventBus for RedisStreamsEventBus {
    #[instrument(
        skip(self, envelope, cancel),
        fields(
            message_id = %envelope.message_id(),
            event_type = envelope.event_type()
        ),
        err
    )]
    async fn publish(
        &self,
        envelope: &EventEnvelope,
        cancel: &CancellationToken,
    ) -> Result<(), BusError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(BusError::Cancelled),
            result = tokio::time::timeout(self.publish_timeout, self.xadd(envelope)) => {
                result.map_err(|_| BusError::Timeout)?
            }
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use peoplehub_core::{MessageId, ModuleName};
use peoplehub_events::IntegrationEvent;

/// A durable record of an integration event waiting to be published.
///
/// State transitions:
/// - `mark_processed`: published; `processed_at` set once, `error` cleared.
/// - `mark_failed`: failed attempt; `error` set, `attempt_count` + 1.
///
/// A row with `attempt_count >= max_attempts` that was never processed is a
/// dead letter: it stays in the store but is never selected again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: MessageId,
    pub module: ModuleName,
    pub message_type: String,
    pub content: String,
    pub occurred_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub attempt_count: u32,
}

impl OutboxMessage {
    pub fn new(
        module: ModuleName,
        message_type: impl Into<String>,
        content: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            module,
            message_type: message_type.into(),
            content: content.into(),
            occurred_at,
            processed_at: None,
            error: None,
            attempt_count: 0,
        }
    }

    /// Serialize a typed integration event into a pending row.
    ///
    /// `occurred_at` is taken from the event, not from the clock.
    pub fn from_event<E: IntegrationEvent>(
        module: ModuleName,
        event: &E,
    ) -> Result<Self, serde_json::Error> {
        let content = serde_json::to_string(event)?;
        Ok(Self::new(
            module,
            E::EVENT_TYPE,
            content,
            IntegrationEvent::occurred_at(event),
        ))
    }

    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }

    pub fn is_dead_letter(&self, max_attempts: u32) -> bool {
        !self.is_processed() && self.attempt_count >= max_attempts
    }

    /// Whether the relay may still pick this row up.
    pub fn is_eligible(&self, max_attempts: u32) -> bool {
        !self.is_processed() && self.attempt_count < max_attempts
    }

    /// Record a successful publish. Idempotent: the first timestamp wins.
    pub fn mark_processed(&mut self, at: DateTime<Utc>) {
        if self.processed_at.is_none() {
            self.processed_at = Some(at);
        }
        self.error = None;
    }

    /// Record a failed attempt. No-op on rows already processed.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        if self.is_processed() {
            return;
        }
        self.error = Some(error.into());
        self.attempt_count = self.attempt_count.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn message() -> OutboxMessage {
        OutboxMessage::new(
            ModuleName::new("identity").unwrap(),
            "identity.account.registered",
            "{}",
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        )
    }

    #[test]
    fn new_message_is_pending() {
        let msg = message();
        assert_eq!(msg.attempt_count, 0);
        assert!(msg.processed_at.is_none());
        assert!(msg.error.is_none());
        assert!(msg.is_eligible(5));
    }

    #[test]
    fn failure_then_success_matches_retry_flow() {
        let mut msg = message();
        msg.mark_failed("timeout");
        assert_eq!(msg.attempt_count, 1);
        assert_eq!(msg.error.as_deref(), Some("timeout"));
        assert!(msg.is_eligible(5));

        let at = Utc::now();
        msg.mark_processed(at);
        assert_eq!(msg.processed_at, Some(at));
        assert!(msg.error.is_none());
        assert_eq!(msg.attempt_count, 1);
        assert!(!msg.is_eligible(5));
    }

    #[test]
    fn mark_processed_is_idempotent() {
        let mut msg = message();
        let first = Utc::now();
        msg.mark_processed(first);
        msg.mark_processed(first + Duration::seconds(30));

        assert_eq!(msg.processed_at, Some(first));

        // A late failure report for an already-published row changes nothing.
        msg.mark_failed("late");
        assert_eq!(msg.attempt_count, 0);
        assert!(msg.error.is_none());
    }

    #[test]
    fn converges_to_dead_letter() {
        let mut msg = message();
        for _ in 0..5 {
            assert!(msg.is_eligible(5));
            msg.mark_failed("unknown event type 'Bogus.Event'");
        }
        assert_eq!(msg.attempt_count, 5);
        assert!(msg.is_dead_letter(5));
        assert!(!msg.is_eligible(5));
    }
}

//! Durable storage contracts.
//!
//! Two traits split the store by caller:
//! - [`DurableStore`] is used by the commit orchestrator: one atomic write of
//!   aggregate states plus outbox rows, and aggregate loading.
//! - [`OutboxStore`] is used by the relay and operators: eligible-row selection,
//!   batch result persistence and dead-letter inspection.
//!
//! Both have an in-memory implementation (tests/dev) and a Postgres one.

mod in_memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use peoplehub_core::{AggregateId, ExpectedVersion, MessageId, ModuleName};

use crate::outbox::OutboxMessage;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("duplicate outbox message: {0}")]
    Duplicate(MessageId),

    #[error("outbox message not found: {0}")]
    NotFound(MessageId),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// New durable state of one aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub aggregate_type: String,
    pub aggregate_id: AggregateId,
    pub expected_version: ExpectedVersion,
    pub state: JsonValue,
}

/// Everything one unit of work persists, written all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitBatch {
    pub states: Vec<StateChange>,
    pub messages: Vec<OutboxMessage>,
}

impl CommitBatch {
    pub fn len(&self) -> usize {
        self.states.len() + self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty() && self.messages.is_empty()
    }
}

/// Persisted aggregate state.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredState {
    pub aggregate_type: String,
    pub aggregate_id: AggregateId,
    pub version: u64,
    pub state: JsonValue,
    pub updated_at: DateTime<Utc>,
}

/// Per-module outbox counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutboxStats {
    pub pending: u64,
    pub processed: u64,
    pub dead_lettered: u64,
}

#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Persist every state change and outbox row in `batch` atomically.
    ///
    /// Returns the number of records written. On error nothing is written.
    async fn commit(&self, batch: CommitBatch) -> Result<usize, StoreError>;

    async fn load_state(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Option<StoredState>, StoreError>;
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Up to `limit` rows of `module` that are unprocessed and have fewer than
    /// `max_attempts` attempts, oldest `occurred_at` first (ties in insertion
    /// order).
    async fn fetch_eligible(
        &self,
        module: &ModuleName,
        limit: usize,
        max_attempts: u32,
    ) -> Result<Vec<OutboxMessage>, StoreError>;

    /// Write back `processed_at`, `error` and `attempt_count` of every message,
    /// all-or-nothing.
    async fn save_results(&self, messages: &[OutboxMessage]) -> Result<(), StoreError>;

    async fn get(&self, id: MessageId) -> Result<Option<OutboxMessage>, StoreError>;

    /// Unprocessed rows of `module` that reached `max_attempts`, oldest first.
    async fn dead_letters(
        &self,
        module: &ModuleName,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, StoreError>;

    async fn stats(&self, module: &ModuleName, max_attempts: u32)
    -> Result<OutboxStats, StoreError>;
}

#[async_trait]
impl<S> DurableStore for Arc<S>
where
    S: DurableStore + ?Sized,
{
    async fn commit(&self, batch: CommitBatch) -> Result<usize, StoreError> {
        (**self).commit(batch).await
    }

    async fn load_state(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Option<StoredState>, StoreError> {
        (**self).load_state(aggregate_type, aggregate_id).await
    }
}

#[async_trait]
impl<S> OutboxStore for Arc<S>
where
    S: OutboxStore + ?Sized,
{
    async fn fetch_eligible(
        &self,
        module: &ModuleName,
        limit: usize,
        max_attempts: u32,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        (**self).fetch_eligible(module, limit, max_attempts).await
    }

    async fn save_results(&self, messages: &[OutboxMessage]) -> Result<(), StoreError> {
        (**self).save_results(messages).await
    }

    async fn get(&self, id: MessageId) -> Result<Option<OutboxMessage>, StoreError> {
        (**self).get(id).await
    }

    async fn dead_letters(
        &self,
        module: &ModuleName,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        (**self).dead_letters(module, max_attempts, limit).await
    }

    async fn stats(
        &self,
        module: &ModuleName,
        max_attempts: u32,
    ) -> Result<OutboxStats, StoreError> {
        (**self).stats(module, max_attempts).await
    }
}

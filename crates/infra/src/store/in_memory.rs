use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use peoplehub_core::{AggregateId, ExpectedVersion, MessageId, ModuleName};

use super::{CommitBatch, DurableStore, OutboxStats, OutboxStore, StoreError, StoredState};
use crate::outbox::OutboxMessage;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StateKey {
    aggregate_type: String,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct Inner {
    states: HashMap<StateKey, StoredState>,
    /// Insertion order doubles as the tie-breaker for equal `occurred_at`.
    messages: Vec<OutboxMessage>,
    index: HashMap<MessageId, usize>,
}

/// In-memory aggregate + outbox store.
///
/// Intended for tests/dev. Not optimized for performance. A commit validates
/// the whole batch before applying anything, so a failed commit leaves no trace.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every outbox row of `module`, in insertion order.
    pub fn messages(&self, module: &ModuleName) -> Vec<OutboxMessage> {
        self.inner
            .read()
            .map(|inner| {
                inner
                    .messages
                    .iter()
                    .filter(|m| &m.module == module)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn state_count(&self) -> usize {
        self.inner.read().map(|i| i.states.len()).unwrap_or(0)
    }

    fn sorted_for(inner: &Inner, module: &ModuleName, filter: impl Fn(&OutboxMessage) -> bool) -> Vec<OutboxMessage> {
        let mut selected: Vec<OutboxMessage> = inner
            .messages
            .iter()
            .filter(|m| &m.module == module && filter(m))
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        selected.sort_by_key(|m| m.occurred_at);
        selected
    }
}

fn poisoned() -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn commit(&self, batch: CommitBatch) -> Result<usize, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut inner = self.inner.write().map_err(|_| poisoned())?;

        // Validate first; apply only when the whole batch is acceptable.
        let mut seen_states = HashSet::new();
        for change in &batch.states {
            let key = StateKey {
                aggregate_type: change.aggregate_type.clone(),
                aggregate_id: change.aggregate_id,
            };
            let current = inner.states.get(&key).map(|s| s.version).unwrap_or(0);
            if !change.expected_version.matches(current) {
                return Err(StoreError::Concurrency(format!(
                    "{} {}: expected {:?}, found {current}",
                    change.aggregate_type, change.aggregate_id, change.expected_version
                )));
            }
            if !seen_states.insert(key) {
                return Err(StoreError::Concurrency(format!(
                    "{} {} appears twice in one commit",
                    change.aggregate_type, change.aggregate_id
                )));
            }
        }

        let mut seen_messages = HashSet::new();
        for message in &batch.messages {
            if inner.index.contains_key(&message.id) || !seen_messages.insert(message.id) {
                return Err(StoreError::Duplicate(message.id));
            }
        }

        let written = batch.len();
        let now = Utc::now();

        for change in batch.states {
            let key = StateKey {
                aggregate_type: change.aggregate_type.clone(),
                aggregate_id: change.aggregate_id,
            };
            let version = match change.expected_version {
                ExpectedVersion::Exact(v) => v + 1,
                ExpectedVersion::Any => inner.states.get(&key).map(|s| s.version + 1).unwrap_or(1),
            };
            inner.states.insert(
                key,
                StoredState {
                    aggregate_type: change.aggregate_type,
                    aggregate_id: change.aggregate_id,
                    version,
                    state: change.state,
                    updated_at: now,
                },
            );
        }

        for message in batch.messages {
            let position = inner.messages.len();
            inner.index.insert(message.id, position);
            inner.messages.push(message);
        }

        Ok(written)
    }

    async fn load_state(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Option<StoredState>, StoreError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        let key = StateKey {
            aggregate_type: aggregate_type.to_string(),
            aggregate_id,
        };
        Ok(inner.states.get(&key).cloned())
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn fetch_eligible(
        &self,
        module: &ModuleName,
        limit: usize,
        max_attempts: u32,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        let mut selected = Self::sorted_for(&inner, module, |m| m.is_eligible(max_attempts));
        selected.truncate(limit);
        Ok(selected)
    }

    async fn save_results(&self, messages: &[OutboxMessage]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;

        let mut positions = Vec::with_capacity(messages.len());
        for message in messages {
            let position = *inner
                .index
                .get(&message.id)
                .ok_or(StoreError::NotFound(message.id))?;
            positions.push(position);
        }

        for (message, position) in messages.iter().zip(positions) {
            let row = &mut inner.messages[position];
            row.processed_at = message.processed_at;
            row.error = message.error.clone();
            row.attempt_count = message.attempt_count;
        }
        Ok(())
    }

    async fn get(&self, id: MessageId) -> Result<Option<OutboxMessage>, StoreError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.index.get(&id).map(|&i| inner.messages[i].clone()))
    }

    async fn dead_letters(
        &self,
        module: &ModuleName,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        let mut selected = Self::sorted_for(&inner, module, |m| m.is_dead_letter(max_attempts));
        selected.truncate(limit);
        Ok(selected)
    }

    async fn stats(
        &self,
        module: &ModuleName,
        max_attempts: u32,
    ) -> Result<OutboxStats, StoreError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        let mut stats = OutboxStats::default();
        for message in inner.messages.iter().filter(|m| &m.module == module) {
            if message.is_processed() {
                stats.processed += 1;
            } else if message.is_dead_letter(max_attempts) {
                stats.dead_lettered += 1;
            } else {
                stats.pending += 1;
            }
        }
        Ok(stats)
    }
}

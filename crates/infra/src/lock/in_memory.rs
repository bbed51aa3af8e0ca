use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{AdvisoryLock, LockError};

/// Process-wide table of held locks, shared by every session.
#[derive(Debug, Default)]
pub struct LockTable {
    held: Mutex<HashMap<String, u64>>,
    next_session: AtomicU64,
}

impl LockTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a new session (the in-memory stand-in for a connection).
    pub fn session(self: &Arc<Self>) -> InMemoryAdvisoryLock {
        InMemoryAdvisoryLock {
            table: Arc::clone(self),
            session: self.next_session.fetch_add(1, Ordering::Relaxed) + 1,
        }
    }

    pub fn is_held(&self, resource: &str) -> bool {
        self.held
            .lock()
            .map(|held| held.contains_key(resource))
            .unwrap_or(false)
    }
}

/// One session on a [`LockTable`].
///
/// Locks are re-entrant per session and released when the session is dropped,
/// like advisory locks on a closed database connection.
#[derive(Debug)]
pub struct InMemoryAdvisoryLock {
    table: Arc<LockTable>,
    session: u64,
}

impl InMemoryAdvisoryLock {
    fn poisoned() -> LockError {
        LockError::Unavailable("lock table poisoned".to_string())
    }
}

#[async_trait]
impl AdvisoryLock for InMemoryAdvisoryLock {
    async fn try_acquire(&self, resource: &str) -> Result<bool, LockError> {
        let mut held = self.table.held.lock().map_err(|_| Self::poisoned())?;
        match held.get(resource) {
            Some(&owner) => Ok(owner == self.session),
            None => {
                held.insert(resource.to_string(), self.session);
                Ok(true)
            }
        }
    }

    async fn release(&self, resource: &str) -> Result<(), LockError> {
        let mut held = self.table.held.lock().map_err(|_| Self::poisoned())?;
        match held.get(resource) {
            Some(&owner) if owner == self.session => {
                held.remove(resource);
                Ok(())
            }
            _ => Err(LockError::NotHeld(resource.to_string())),
        }
    }
}

impl Drop for InMemoryAdvisoryLock {
    fn drop(&mut self) {
        if let Ok(mut held) = self.table.held.lock() {
            held.retain(|_, owner| *owner != self.session);
        }
    }
}

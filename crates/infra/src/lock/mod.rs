//! Named, session-scoped advisory locks.
//!
//! The relay takes `outbox:<module>` before draining a module's outbox so only
//! one instance works a partition at a time. Acquisition never blocks: a held
//! lock simply means "someone else is on it, skip this tick".

mod in_memory;
mod postgres;
#[cfg(feature = "redis")]
mod redis_lease;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use in_memory::{InMemoryAdvisoryLock, LockTable};
pub use postgres::PgAdvisoryLock;
#[cfg(feature = "redis")]
pub use redis_lease::RedisLeaseLock;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock backend unavailable: {0}")]
    Unavailable(String),

    #[error("lock '{0}' is not held by this session")]
    NotHeld(String),
}

/// A session that can hold named locks.
///
/// Every backend follows the same rules:
/// - `try_acquire` on a resource this session already holds returns
///   `Ok(true)` without nesting; one `release` frees it.
/// - `release` of a resource this session does not hold is
///   [`LockError::NotHeld`].
/// - Dropping the session frees whatever it still holds, or lets it expire.
#[async_trait]
pub trait AdvisoryLock: Send + Sync {
    /// Try to take `resource` without waiting. `Ok(false)` means another
    /// session holds it.
    async fn try_acquire(&self, resource: &str) -> Result<bool, LockError>;

    async fn release(&self, resource: &str) -> Result<(), LockError>;
}

#[async_trait]
impl<L> AdvisoryLock for Arc<L>
where
    L: AdvisoryLock + ?Sized,
{
    async fn try_acquire(&self, resource: &str) -> Result<bool, LockError> {
        (**self).try_acquire(resource).await
    }

    async fn release(&self, resource: &str) -> Result<(), LockError> {
        (**self).release(resource).await
    }
}

//! Postgres advisory locks.
//!
//! `pg_try_advisory_lock` is scoped to the database session, so each held lock
//! keeps its own pooled connection checked out until release. If the process
//! dies the connection closes and the server frees the lock.
//!
//! Dropping a [`PgAdvisoryLock`] that still holds locks detaches those
//! connections from the pool and closes them, so a held session never goes
//! back to the pool for someone else to reuse.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::pool::PoolConnection;
use sqlx::postgres::Postgres;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{AdvisoryLock, LockError};

#[derive(Debug)]
pub struct PgAdvisoryLock {
    pool: PgPool,
    sessions: Mutex<HashMap<String, PoolConnection<Postgres>>>,
}

impl PgAdvisoryLock {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

fn unavailable(err: sqlx::Error) -> LockError {
    LockError::Unavailable(err.to_string())
}

#[async_trait]
impl AdvisoryLock for PgAdvisoryLock {
    async fn try_acquire(&self, resource: &str) -> Result<bool, LockError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(resource) {
            // Already ours; taking it again would nest the server-side lock.
            return Ok(true);
        }

        let mut conn = self.pool.acquire().await.map_err(unavailable)?;
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtextextended($1, 0))")
            .bind(resource)
            .fetch_one(&mut *conn)
            .await
            .map_err(unavailable)?;

        if acquired {
            sessions.insert(resource.to_string(), conn);
        }
        Ok(acquired)
    }

    async fn release(&self, resource: &str) -> Result<(), LockError> {
        let Some(mut conn) = self.sessions.lock().await.remove(resource) else {
            return Err(LockError::NotHeld(resource.to_string()));
        };

        let unlocked = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock(hashtextextended($1, 0))")
            .bind(resource)
            .fetch_one(&mut *conn)
            .await;

        match unlocked {
            Ok(true) => Ok(()),
            Ok(false) => {
                debug!(resource, "advisory lock was not held by session");
                Err(LockError::NotHeld(resource.to_string()))
            }
            Err(err) => {
                // Closing the session is the only way left to free the lock.
                warn!(resource, error = %err, "advisory unlock failed; closing session");
                let _ = conn.close().await;
                Err(unavailable(err))
            }
        }
    }
}

impl Drop for PgAdvisoryLock {
    fn drop(&mut self) {
        for (resource, conn) in self.sessions.get_mut().drain() {
            warn!(resource = %resource, "advisory lock dropped while held; closing its session");
            drop(conn.detach());
        }
    }
}

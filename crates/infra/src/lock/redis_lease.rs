//! Redis lease lock.
//!
//! An acquire script sets `<resource> = <owner>` with a `PX <ttl>` expiry when
//! the key is free, and renews the lease when this instance already owns it.
//! A compare-and-delete script releases it only if this instance still owns
//! it. The TTL plays the role of session scope: a crashed holder's lease
//! simply expires.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::{AdvisoryLock, LockError};

const ACQUIRE_SCRIPT: &str = r#"
local current = redis.call("GET", KEYS[1])
if current == ARGV[1] then
    redis.call("PEXPIRE", KEYS[1], ARGV[2])
    return 1
elseif current then
    return 0
end
redis.call("SET", KEYS[1], ARGV[1], "PX", ARGV[2])
return 1
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Default lease duration; must comfortably exceed one relay iteration.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct RedisLeaseLock {
    client: Arc<redis::Client>,
    owner: String,
    ttl: Duration,
    key_prefix: String,
}

impl RedisLeaseLock {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, LockError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| LockError::Unavailable(e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
            owner: Uuid::now_v7().to_string(),
            ttl: DEFAULT_LEASE_TTL,
            key_prefix: "peoplehub:lock:".to_string(),
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn key(&self, resource: &str) -> String {
        format!("{}{}", self.key_prefix, resource)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, LockError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| LockError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl AdvisoryLock for RedisLeaseLock {
    async fn try_acquire(&self, resource: &str) -> Result<bool, LockError> {
        let mut conn = self.connection().await?;
        let ttl_ms = u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX);
        let acquired: i64 = redis::Script::new(ACQUIRE_SCRIPT)
            .key(self.key(resource))
            .arg(&self.owner)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::Unavailable(e.to_string()))?;
        Ok(acquired == 1)
    }

    async fn release(&self, resource: &str) -> Result<(), LockError> {
        let mut conn = self.connection().await?;
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(self.key(resource))
            .arg(&self.owner)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::Unavailable(e.to_string()))?;

        if deleted == 1 {
            Ok(())
        } else {
            Err(LockError::NotHeld(resource.to_string()))
        }
    }
}

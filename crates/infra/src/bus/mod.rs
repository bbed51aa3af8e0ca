//! Event bus adapters backed by external brokers.

#[cfg(feature = "redis")]
mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsEventBus;

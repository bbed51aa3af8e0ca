//! `peoplehub-worker`: runs one outbox relay per configured module until
//! interrupted.

mod config;

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

use peoplehub_events::{EventBus, EventRegistry, LoggingEventBus};
use peoplehub_infra::bus::RedisStreamsEventBus;
use peoplehub_infra::lock::RedisLeaseLock;
use peoplehub_infra::{AdvisoryLock, OutboxRelay, PgAdvisoryLock, PostgresStore};

use crate::config::{LockBackend, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    peoplehub_observability::init();

    let config = WorkerConfig::from_env().context("invalid worker configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let store = Arc::new(PostgresStore::new(pool.clone()));
    store.migrate().await.context("failed to prepare outbox schema")?;

    let mut registry = EventRegistry::new();
    peoplehub_identity::register_integration_events(&mut registry);
    let registry = Arc::new(registry);

    let bus: Arc<dyn EventBus> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisStreamsEventBus::new(url, None).context("invalid Redis configuration")?,
        ),
        None => {
            tracing::warn!("REDIS_URL not set; integration events are only logged");
            Arc::new(LoggingEventBus)
        }
    };

    let cancel = CancellationToken::new();
    let mut handles = Vec::with_capacity(config.modules.len());
    for module in &config.modules {
        let relay = OutboxRelay::new(
            module.clone(),
            Arc::clone(&store),
            relay_lock(&config, &pool)?,
            Arc::clone(&bus),
            Arc::clone(&registry),
            config.relay.clone(),
        );
        handles.push(relay.spawn(cancel.child_token()));
    }

    tracing::info!(
        modules = handles.len(),
        lock_backend = ?config.lock_backend,
        decoders = registry.len(),
        "worker started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested");
    cancel.cancel();

    for handle in handles {
        let module = handle.module().clone();
        let stats = handle.stats();
        handle.shutdown().await;
        tracing::info!(
            module = %module,
            iterations = stats.iterations,
            published = stats.published,
            dead_lettered = stats.dead_lettered,
            "relay stopped"
        );
    }

    pool.close().await;
    Ok(())
}

/// Each relay gets its own lock session.
fn relay_lock(config: &WorkerConfig, pool: &PgPool) -> anyhow::Result<Arc<dyn AdvisoryLock>> {
    match (config.lock_backend, &config.redis_url) {
        (LockBackend::Redis, Some(url)) => Ok(Arc::new(
            RedisLeaseLock::new(url).context("invalid Redis lock configuration")?,
        )),
        (LockBackend::Redis, None) => anyhow::bail!("Redis locks require REDIS_URL"),
        (LockBackend::Postgres, _) => Ok(Arc::new(PgAdvisoryLock::new(pool.clone()))),
    }
}

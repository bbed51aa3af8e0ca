//! Postgres-backed aggregate + outbox store.
//!
//! Schema (created by [`PostgresStore::migrate`]):
//!
//! - `aggregate_states (aggregate_type, aggregate_id, version, state, updated_at)`,
//!   primary key `(aggregate_type, aggregate_id)`.
//! - `outbox_messages (seq, id, module, message_type, content, occurred_at,
//!   processed_at, error, attempt_count)`, primary key `id`; `seq` is a
//!   `BIGSERIAL` used as the tie-breaker for equal `occurred_at`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Concurrency` (state) / `Duplicate` (outbox) |
//! | Database (other) | Any other | `Storage` |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` |
//! | Other | N/A | `Storage` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, debug, instrument};

use peoplehub_core::{AggregateId, ExpectedVersion, MessageId, ModuleName};

use super::{CommitBatch, DurableStore, OutboxStats, OutboxStore, StateChange, StoreError, StoredState};
use crate::outbox::OutboxMessage;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS aggregate_states (
        aggregate_type TEXT NOT NULL,
        aggregate_id UUID NOT NULL,
        version BIGINT NOT NULL CHECK (version > 0),
        state JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (aggregate_type, aggregate_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS outbox_messages (
        seq BIGSERIAL UNIQUE,
        id UUID PRIMARY KEY,
        module TEXT NOT NULL,
        message_type TEXT NOT NULL,
        content TEXT NOT NULL,
        occurred_at TIMESTAMPTZ NOT NULL,
        processed_at TIMESTAMPTZ NULL,
        error TEXT NULL,
        attempt_count INTEGER NOT NULL DEFAULT 0 CHECK (attempt_count >= 0)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_outbox_messages_pending
        ON outbox_messages (module, occurred_at, seq)
        WHERE processed_at IS NULL
    "#,
];

const OUTBOX_COLUMNS: &str =
    "id, module, message_type, content, occurred_at, processed_at, error, attempt_count";

/// Postgres-backed implementation of [`DurableStore`] and [`OutboxStore`].
///
/// Every commit runs in one transaction: state upserts guarded by the expected
/// version, then outbox inserts. Dropping the transaction on any error rolls
/// the whole unit of work back.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        debug!("outbox schema ready");
        Ok(())
    }

    async fn write_state(
        tx: &mut Transaction<'_, Postgres>,
        change: &StateChange,
    ) -> Result<(), StoreError> {
        let result = match change.expected_version {
            ExpectedVersion::Exact(0) => sqlx::query(
                r#"
                INSERT INTO aggregate_states (aggregate_type, aggregate_id, version, state, updated_at)
                VALUES ($1, $2, 1, $3, NOW())
                "#,
            )
            .bind(&change.aggregate_type)
            .bind(change.aggregate_id.as_uuid())
            .bind(&change.state)
            .execute(&mut **tx)
            .await,
            ExpectedVersion::Exact(version) => sqlx::query(
                r#"
                UPDATE aggregate_states
                SET version = version + 1, state = $3, updated_at = NOW()
                WHERE aggregate_type = $1 AND aggregate_id = $2 AND version = $4
                "#,
            )
            .bind(&change.aggregate_type)
            .bind(change.aggregate_id.as_uuid())
            .bind(&change.state)
            .bind(to_i64(version)?)
            .execute(&mut **tx)
            .await,
            ExpectedVersion::Any => sqlx::query(
                r#"
                INSERT INTO aggregate_states (aggregate_type, aggregate_id, version, state, updated_at)
                VALUES ($1, $2, 1, $3, NOW())
                ON CONFLICT (aggregate_type, aggregate_id)
                DO UPDATE SET version = aggregate_states.version + 1,
                              state = EXCLUDED.state,
                              updated_at = NOW()
                "#,
            )
            .bind(&change.aggregate_type)
            .bind(change.aggregate_id.as_uuid())
            .bind(&change.state)
            .execute(&mut **tx)
            .await,
        };

        let result = result.map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Concurrency(format!(
                    "{} {} already exists",
                    change.aggregate_type, change.aggregate_id
                ))
            } else {
                map_sqlx_error("write_state", e)
            }
        })?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Concurrency(format!(
                "{} {}: expected {:?}",
                change.aggregate_type, change.aggregate_id, change.expected_version
            )));
        }
        Ok(())
    }

    async fn insert_message(
        tx: &mut Transaction<'_, Postgres>,
        message: &OutboxMessage,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO outbox_messages
                (id, module, message_type, content, occurred_at, processed_at, error, attempt_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(message.id.as_uuid())
        .bind(message.module.as_str())
        .bind(&message.message_type)
        .bind(&message.content)
        .bind(message.occurred_at)
        .bind(message.processed_at)
        .bind(message.error.as_deref())
        .bind(to_i32(message.attempt_count)?)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(message.id)
            } else {
                map_sqlx_error("insert_message", e)
            }
        })?;
        Ok(())
    }
}

#[async_trait]
impl DurableStore for PostgresStore {
    #[instrument(
        skip(self, batch),
        fields(states = batch.states.len(), messages = batch.messages.len()),
        err
    )]
    async fn commit(&self, batch: CommitBatch) -> Result<usize, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        for change in &batch.states {
            Self::write_state(&mut tx, change).await?;
        }
        for message in &batch.messages {
            Self::insert_message(&mut tx, message).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;

        Ok(batch.len())
    }

    #[instrument(skip(self), fields(aggregate_id = %aggregate_id), err)]
    async fn load_state(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Option<StoredState>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT aggregate_type, aggregate_id, version, state, updated_at
            FROM aggregate_states
            WHERE aggregate_type = $1 AND aggregate_id = $2
            "#,
        )
        .bind(aggregate_type)
        .bind(aggregate_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_state", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let version: i64 = row.try_get("version").map_err(|e| map_sqlx_error("load_state", e))?;
        let id: uuid::Uuid = row
            .try_get("aggregate_id")
            .map_err(|e| map_sqlx_error("load_state", e))?;
        Ok(Some(StoredState {
            aggregate_type: row
                .try_get("aggregate_type")
                .map_err(|e| map_sqlx_error("load_state", e))?,
            aggregate_id: AggregateId::from_uuid(id),
            version: u64::try_from(version)
                .map_err(|_| StoreError::Storage(format!("negative version {version}")))?,
            state: row.try_get("state").map_err(|e| map_sqlx_error("load_state", e))?,
            updated_at: row
                .try_get("updated_at")
                .map_err(|e| map_sqlx_error("load_state", e))?,
        }))
    }
}

#[async_trait]
impl OutboxStore for PostgresStore {
    #[instrument(skip(self), fields(module = %module, selected = tracing::field::Empty), err)]
    async fn fetch_eligible(
        &self,
        module: &ModuleName,
        limit: usize,
        max_attempts: u32,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        let sql = format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox_messages \
             WHERE module = $1 AND processed_at IS NULL AND attempt_count < $2 \
             ORDER BY occurred_at ASC, seq ASC \
             LIMIT $3"
        );
        let rows: Vec<OutboxRow> = sqlx::query_as(&sql)
            .bind(module.as_str())
            .bind(to_i32(max_attempts)?)
            .bind(to_i64(limit as u64)?)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_eligible", e))?;

        Span::current().record("selected", rows.len());
        rows.into_iter().map(OutboxMessage::try_from).collect()
    }

    #[instrument(skip(self, messages), fields(messages = messages.len()), err)]
    async fn save_results(&self, messages: &[OutboxMessage]) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        for message in messages {
            let result = sqlx::query(
                r#"
                UPDATE outbox_messages
                SET processed_at = $2, error = $3, attempt_count = $4
                WHERE id = $1
                "#,
            )
            .bind(message.id.as_uuid())
            .bind(message.processed_at)
            .bind(message.error.as_deref())
            .bind(to_i32(message.attempt_count)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("save_results", e))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(message.id));
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(message_id = %id), err)]
    async fn get(&self, id: MessageId) -> Result<Option<OutboxMessage>, StoreError> {
        let sql = format!("SELECT {OUTBOX_COLUMNS} FROM outbox_messages WHERE id = $1");
        let row: Option<OutboxRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;
        row.map(OutboxMessage::try_from).transpose()
    }

    #[instrument(skip(self), fields(module = %module), err)]
    async fn dead_letters(
        &self,
        module: &ModuleName,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        let sql = format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox_messages \
             WHERE module = $1 AND processed_at IS NULL AND attempt_count >= $2 \
             ORDER BY occurred_at ASC, seq ASC \
             LIMIT $3"
        );
        let rows: Vec<OutboxRow> = sqlx::query_as(&sql)
            .bind(module.as_str())
            .bind(to_i32(max_attempts)?)
            .bind(to_i64(limit as u64)?)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("dead_letters", e))?;
        rows.into_iter().map(OutboxMessage::try_from).collect()
    }

    #[instrument(skip(self), fields(module = %module), err)]
    async fn stats(
        &self,
        module: &ModuleName,
        max_attempts: u32,
    ) -> Result<OutboxStats, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE processed_at IS NOT NULL) AS processed,
                COUNT(*) FILTER (WHERE processed_at IS NULL AND attempt_count >= $2) AS dead_lettered,
                COUNT(*) FILTER (WHERE processed_at IS NULL AND attempt_count < $2) AS pending
            FROM outbox_messages
            WHERE module = $1
            "#,
        )
        .bind(module.as_str())
        .bind(to_i32(max_attempts)?)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stats", e))?;

        let count = |column: &str| -> Result<u64, StoreError> {
            let value: i64 = row.try_get(column).map_err(|e| map_sqlx_error("stats", e))?;
            Ok(value.max(0) as u64)
        };

        Ok(OutboxStats {
            pending: count("pending")?,
            processed: count("processed")?,
            dead_lettered: count("dead_lettered")?,
        })
    }
}

fn to_i32(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Storage(format!("value {value} out of range")))
}

fn to_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Storage(format!("value {value} out of range")))
}

/// Map SQLx errors to StoreError, classifying by SQLSTATE where possible.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Concurrency(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        other => StoreError::Storage(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

// SQLx row types

#[derive(Debug)]
struct OutboxRow {
    id: uuid::Uuid,
    module: String,
    message_type: String,
    content: String,
    occurred_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    error: Option<String>,
    attempt_count: i32,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for OutboxRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(OutboxRow {
            id: row.try_get("id")?,
            module: row.try_get("module")?,
            message_type: row.try_get("message_type")?,
            content: row.try_get("content")?,
            occurred_at: row.try_get("occurred_at")?,
            processed_at: row.try_get("processed_at")?,
            error: row.try_get("error")?,
            attempt_count: row.try_get("attempt_count")?,
        })
    }
}

impl TryFrom<OutboxRow> for OutboxMessage {
    type Error = StoreError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        let module = ModuleName::new(row.module)
            .map_err(|e| StoreError::Storage(format!("invalid module in outbox row {}: {e}", row.id)))?;
        let attempt_count = u32::try_from(row.attempt_count).map_err(|_| {
            StoreError::Storage(format!(
                "negative attempt_count {} in outbox row {}",
                row.attempt_count, row.id
            ))
        })?;
        Ok(OutboxMessage {
            id: MessageId::from_uuid(row.id),
            module,
            message_type: row.message_type,
            content: row.content,
            occurred_at: row.occurred_at,
            processed_at: row.processed_at,
            error: row.error,
            attempt_count,
        })
    }
}

//! Infrastructure layer for the event-relay core.
//!
//! - [`unit_of_work`] + [`orchestrator`]: atomic commit of aggregate changes and
//!   outbox rows, with local event dispatch.
//! - [`outbox`] + [`store`]: the durable outbox and its storage backends.
//! - [`lock`]: named advisory locks (in-memory, Postgres, Redis).
//! - [`relay`]: the background publisher draining each module's outbox.
//! - [`bus`]: broker-backed bus adapters.

pub mod bus;
pub mod config;
pub mod lock;
pub mod orchestrator;
pub mod outbox;
pub mod relay;
pub mod store;
pub mod unit_of_work;

pub use config::{ConfigError, RelayConfig};
pub use lock::{AdvisoryLock, InMemoryAdvisoryLock, LockError, LockTable, PgAdvisoryLock};
pub use orchestrator::{CommitError, CommitOrchestrator};
pub use outbox::OutboxMessage;
pub use relay::{BatchSummary, IterationOutcome, OutboxRelay, RelayError, RelayHandle, RelayStats};
pub use store::{
    CommitBatch, DurableStore, InMemoryStore, OutboxStats, OutboxStore, PostgresStore,
    StateChange, StoreError, StoredState,
};
pub use unit_of_work::{Aggregate, UnitOfWork};

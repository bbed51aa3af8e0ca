//! Transactional outbox.
//!
//! Outbox rows are written in the same atomic commit as the business change
//! that produced them and drained later by the [`OutboxRelay`](crate::relay::OutboxRelay).

mod message;

pub use message::OutboxMessage;

//! Event publishing abstraction (mechanics only).
//!
//! The bus is the **external** transport between modules. The outbox relay is
//! its only publisher in this workspace; the bus itself is not implemented
//! here beyond development/test adapters.
//!
//! ## Delivery Guarantees
//!
//! Publishing is **at-least-once**: a relay may publish a message and crash
//! before recording success, so the same `message_id` can be delivered again.
//! Consumers must be idempotent.
//!
//! ## Error Handling
//!
//! `publish()` failures are never fatal to the caller. The relay records them on
//! the outbox row (`error`, `attempt_count`) and retries on a later iteration.
//!
//! ## Cancellation
//!
//! Every publish receives the relay's cancellation token. Implementations that
//! block on IO should abandon the call and return [`BusError::Cancelled`] once
//! the token fires.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::envelope::EventEnvelope;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("bus unavailable: {0}")]
    Unavailable(String),

    #[error("timeout")]
    Timeout,

    #[error("publish cancelled")]
    Cancelled,

    #[error("rejected by bus: {0}")]
    Rejected(String),
}

/// A subscription to an in-process event stream.
///
/// Each subscription gets a copy of every envelope published after it was
/// created (broadcast semantics). Intended for tests and local tooling.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// External message bus as seen by the outbox relay.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(
        &self,
        envelope: &EventEnvelope,
        cancel: &CancellationToken,
    ) -> Result<(), BusError>;
}

#[async_trait]
impl<B> EventBus for Arc<B>
where
    B: EventBus + ?Sized,
{
    async fn publish(
        &self,
        envelope: &EventEnvelope,
        cancel: &CancellationToken,
    ) -> Result<(), BusError> {
        (**self).publish(envelope, cancel).await
    }
}

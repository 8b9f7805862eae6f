//! Decoupling queue between the evaluator and the window counter
//!
//! Delivery is at-least-once: a message leaves the queue only when the
//! consumer acknowledges it. A negative acknowledgement, or a consumer that
//! disappears while holding a message, puts it back for redelivery.

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::common::errors::{DetectorError, Result};
use crate::common::types::QueuedEvent;

pub use memory::InMemoryQueue;
pub use postgres::PgEventQueue;

/// Name of the queue trigger-matching events are published to
pub const TRIGGER_EVENTS_QUEUE: &str = "trigger_events";

/// A message handed to a consumer, pending acknowledgement
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Acknowledgement handle
    pub tag: u64,
    /// JSON payload as published
    pub payload: Vec<u8>,
    /// Set when the message has been delivered before
    pub redelivered: bool,
}

impl Delivery {
    pub fn decode(&self) -> Result<QueuedEvent> {
        serde_json::from_slice(&self.payload).map_err(DetectorError::from)
    }
}

#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Durably enqueue an event
    async fn publish(&self, event: &QueuedEvent) -> Result<()>;

    /// Wait for the next message. A consumer holds at most one unacknowledged
    /// message at a time, so it must `ack`/`nack` before asking again.
    async fn next_delivery(&self) -> Result<Delivery>;

    /// Remove the message for good
    async fn ack(&self, tag: u64) -> Result<()>;

    /// Return the message to the head of the queue
    async fn nack(&self, tag: u64) -> Result<()>;

    /// Release the underlying handle; further calls fail with `QueueUnavailable`
    async fn close(&self) -> Result<()>;
}

/// Serialise an event into the queue wire format
pub fn encode(event: &QueuedEvent) -> Result<Vec<u8>> {
    serde_json::to_vec(event).map_err(DetectorError::from)
}

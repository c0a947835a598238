//! Queue collaborators
//!
//! Three capabilities are kept separate so the task processor only sees the
//! one it needs:
//! - [`LeaseExtender`] - keep a delivery invisible to other consumers
//! - [`MessageSource`] - receive and acknowledge inbound messages (worker only)
//! - [`NotificationPublisher`] - publish the downstream notification
//!
//! [`SqsQueue`] implements all three.

use std::time::Duration;

use crate::error::{LeaseError, QueueError};
use crate::types::{DeliveryToken, OutboundNotification, ReceivedMessage};

pub mod sqs;

pub use sqs::SqsQueue;

/// Extends the exclusive visibility window of one delivery.
///
/// Best-effort: callers log failures and carry on with the current lease.
#[async_trait::async_trait]
pub trait LeaseExtender: Send + Sync {
    /// Make the delivery invisible for `duration` from now
    async fn extend(&self, token: &DeliveryToken, duration: Duration) -> Result<(), LeaseError>;
}

/// Source of inbound messages
#[async_trait::async_trait]
pub trait MessageSource: Send + Sync {
    /// Receive at most `max_messages` messages; may return an empty batch
    async fn receive(&self, max_messages: usize) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Remove a successfully handled message from the queue
    async fn acknowledge(&self, token: &DeliveryToken) -> Result<(), QueueError>;
}

/// Publishes notifications for downstream consumers
#[async_trait::async_trait]
pub trait NotificationPublisher: Send + Sync {
    /// Enqueue one notification
    async fn publish(&self, notification: &OutboundNotification) -> Result<(), QueueError>;
}

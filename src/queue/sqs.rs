//! Amazon SQS adapter.
//!
//! One client serves both queues: messages are received from, acknowledged
//! on and lease-extended against the input queue, and notifications are sent
//! to the output queue.

use std::time::Duration;

use aws_sdk_sqs::Client;
use aws_sdk_sqs::error::DisplayErrorContext;

use crate::config::{MAX_VISIBILITY_TIMEOUT_SECS, QueueConfig};
use crate::error::{LeaseError, QueueError};
use crate::types::{DeliveryToken, OutboundNotification, ReceivedMessage};

use super::{LeaseExtender, MessageSource, NotificationPublisher};

/// SQS-backed queue collaborator
#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: Client,
    input_queue_url: String,
    output_queue_url: String,
    batch_size: i32,
    wait_time_secs: i32,
}

impl SqsQueue {
    /// Create a queue adapter with a pre-built SQS client
    pub fn new(client: Client, config: &QueueConfig) -> Self {
        Self {
            client,
            input_queue_url: config.input_queue_url.clone(),
            output_queue_url: config.output_queue_url.clone(),
            batch_size: config.receive_batch_size,
            wait_time_secs: i32::try_from(config.wait_time.as_secs()).unwrap_or(20),
        }
    }

    /// Create a queue adapter using the standard AWS SDK config chain
    ///
    /// Loads credentials and region from environment variables, AWS profiles,
    /// or instance metadata.
    pub async fn from_env(config: &QueueConfig) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&sdk_config), config)
    }
}

/// Convert a lease duration to the whole seconds SQS accepts
///
/// Durations above the SQS maximum are clamped; sub-second durations are rejected.
pub(crate) fn visibility_timeout_secs(duration: Duration) -> Result<i32, LeaseError> {
    let secs = duration.as_secs();
    if secs == 0 {
        return Err(LeaseError::InvalidDuration(secs));
    }
    let clamped = secs.min(MAX_VISIBILITY_TIMEOUT_SECS);
    i32::try_from(clamped).map_err(|_| LeaseError::InvalidDuration(secs))
}

/// Batch size for one receive call: the configured size, capped at what the
/// caller can take right now, and never below one
pub(crate) fn batch_limit(batch_size: i32, max_messages: usize) -> i32 {
    i32::try_from(max_messages)
        .unwrap_or(i32::MAX)
        .min(batch_size)
        .max(1)
}

#[async_trait::async_trait]
impl LeaseExtender for SqsQueue {
    async fn extend(&self, token: &DeliveryToken, duration: Duration) -> Result<(), LeaseError> {
        let timeout = visibility_timeout_secs(duration)?;

        self.client
            .change_message_visibility()
            .queue_url(&self.input_queue_url)
            .receipt_handle(token.expose())
            .visibility_timeout(timeout)
            .send()
            .await
            .map_err(|e| LeaseError::Rejected(DisplayErrorContext(e).to_string()))?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageSource for SqsQueue {
    async fn receive(&self, max_messages: usize) -> Result<Vec<ReceivedMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.input_queue_url)
            .max_number_of_messages(batch_limit(self.batch_size, max_messages))
            .wait_time_seconds(self.wait_time_secs)
            .send()
            .await
            .map_err(|e| QueueError::Receive(DisplayErrorContext(e).to_string()))?;

        let messages = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| ReceivedMessage {
                message_id: m.message_id,
                body: m.body.unwrap_or_default(),
                token: m.receipt_handle.map(DeliveryToken::new),
            })
            .collect();

        Ok(messages)
    }

    async fn acknowledge(&self, token: &DeliveryToken) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.input_queue_url)
            .receipt_handle(token.expose())
            .send()
            .await
            .map_err(|e| QueueError::Acknowledge(DisplayErrorContext(e).to_string()))?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl NotificationPublisher for SqsQueue {
    async fn publish(&self, notification: &OutboundNotification) -> Result<(), QueueError> {
        let body = serde_json::to_string(notification)
            .map_err(|e| QueueError::Publish(format!("failed to encode notification: {e}")))?;

        self.client
            .send_message()
            .queue_url(&self.output_queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| QueueError::Publish(DisplayErrorContext(e).to_string()))?;

        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_timeout_accepts_whole_seconds_in_range() {
        assert_eq!(visibility_timeout_secs(Duration::from_secs(60)).unwrap(), 60);
        assert_eq!(
            visibility_timeout_secs(Duration::from_secs(MAX_VISIBILITY_TIMEOUT_SECS)).unwrap(),
            43_200
        );
    }

    #[test]
    fn visibility_timeout_truncates_sub_second_part() {
        assert_eq!(
            visibility_timeout_secs(Duration::from_millis(1_999)).unwrap(),
            1
        );
    }

    #[test]
    fn visibility_timeout_rejects_sub_second_durations() {
        assert!(matches!(
            visibility_timeout_secs(Duration::from_millis(500)),
            Err(LeaseError::InvalidDuration(0))
        ));
    }

    #[test]
    fn visibility_timeout_clamps_to_queue_maximum() {
        assert_eq!(
            visibility_timeout_secs(Duration::from_secs(MAX_VISIBILITY_TIMEOUT_SECS + 1)).unwrap(),
            43_200
        );
        assert_eq!(
            visibility_timeout_secs(Duration::from_secs(u64::MAX)).unwrap(),
            43_200
        );
    }

    #[test]
    fn batch_limit_never_exceeds_free_slots() {
        assert_eq!(batch_limit(10, 4), 4);
        assert_eq!(batch_limit(10, 1), 1);
        assert_eq!(batch_limit(3, 8), 3);
    }

    #[test]
    fn batch_limit_is_at_least_one() {
        assert_eq!(batch_limit(10, 0), 1);
        assert_eq!(batch_limit(10, usize::MAX), 10);
    }
}

//! Queue consumer: receives message batches and runs one task per message.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use crate::processor::TaskProcessor;
use crate::queue::MessageSource;
use crate::retry::with_retry;
use crate::types::{Event, ReceivedMessage, TaskOutcome};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Long-running consumer of the input queue.
///
/// Each received message is processed on its own tokio task, bounded by
/// `processing.max_concurrent_tasks`. Completed and skipped messages are
/// acknowledged; failed ones are left for the queue to redeliver.
#[derive(Clone)]
pub struct Worker {
    source: Arc<dyn MessageSource>,
    processor: TaskProcessor,
    retry: RetryConfig,
    max_concurrent: usize,
    shutdown_grace: Duration,
    concurrent_limit: Arc<Semaphore>,
    cancel_token: CancellationToken,
    event_tx: broadcast::Sender<Event>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("max_concurrent", &self.max_concurrent)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("cancelled", &self.cancel_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Worker {
    /// Create a worker; the processor's events are routed to [`Worker::subscribe`]
    pub fn new(source: Arc<dyn MessageSource>, processor: TaskProcessor, config: &Config) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let max_concurrent = config.processing.max_concurrent_tasks.max(1);

        Self {
            source,
            processor: processor.with_events(event_tx.clone()),
            retry: config.retry.clone(),
            max_concurrent,
            shutdown_grace: config.processing.shutdown_grace,
            concurrent_limit: Arc::new(Semaphore::new(max_concurrent)),
            cancel_token: CancellationToken::new(),
            event_tx,
        }
    }

    /// Subscribe to task events
    ///
    /// Slow receivers may observe `RecvError::Lagged` and miss events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Number of tasks currently running
    pub fn active_tasks(&self) -> usize {
        self.max_concurrent - self.concurrent_limit.available_permits()
    }

    /// Start the consumer loop
    ///
    /// The loop:
    /// 1. Waits for a free concurrency slot
    /// 2. Receives at most as many messages as there are free slots (retrying
    ///    transient failures with backoff)
    /// 3. Spawns a task that processes and, on success or skip, acknowledges it
    /// 4. Repeats until [`Worker::shutdown`] is called
    pub fn start_consumer(&self) -> tokio::task::JoinHandle<()> {
        let worker = self.clone();

        tokio::spawn(async move {
            tracing::info!(max_concurrent = worker.max_concurrent, "Queue consumer started");
            loop {
                let polled = tokio::select! {
                    biased;
                    _ = worker.cancel_token.cancelled() => break,
                    polled = worker.poll_once() => polled,
                };

                match polled {
                    Ok(_) => {}
                    Err(Error::ShuttingDown) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "Receiving from input queue failed, backing off");
                        tokio::select! {
                            _ = worker.cancel_token.cancelled() => break,
                            _ = tokio::time::sleep(worker.retry.max_delay) => {}
                        }
                    }
                }
            }
            tracing::info!("Queue consumer stopped");
        })
    }

    /// Receive one batch and dispatch every message in it.
    ///
    /// Waits for a free concurrency slot first and asks the queue for no more
    /// messages than there are free slots, so a received message never waits
    /// for a permit outside its lease. Returns the number of messages
    /// dispatched; processing continues in the background after this returns.
    pub async fn poll_once(&self) -> Result<usize> {
        if self.cancel_token.is_cancelled() {
            return Err(Error::ShuttingDown);
        }

        let mut next_permit = Some(self.acquire_permit().await?);
        let capacity = self.concurrent_limit.available_permits() + 1;

        let source = Arc::clone(&self.source);
        let messages = with_retry(&self.retry, || source.receive(capacity)).await?;
        if messages.is_empty() {
            return Ok(0);
        }
        tracing::debug!(count = messages.len(), capacity, "Received message batch");

        let mut dispatched = 0;
        for message in messages {
            // Normally immediate: only polls take permits outside of shutdown
            let permit = match next_permit.take() {
                Some(p) => p,
                None => self.acquire_permit().await?,
            };

            let source = Arc::clone(&self.source);
            let processor = self.processor.clone();
            tokio::spawn(async move {
                let _permit = permit;
                handle_message(source.as_ref(), &processor, message).await;
            });
            dispatched += 1;
        }

        Ok(dispatched)
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.concurrent_limit)
            .acquire_owned()
            .await
            // Semaphore closed: leave the rest for redelivery
            .map_err(|_| Error::ShuttingDown)
    }

    /// Stop receiving and wait for in-flight tasks.
    ///
    /// Waits up to `processing.shutdown_grace`; tasks still running after that
    /// keep their messages unacknowledged and are redelivered later.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");
        self.cancel_token.cancel();

        let permits = u32::try_from(self.max_concurrent).unwrap_or(u32::MAX);
        let drained = tokio::time::timeout(
            self.shutdown_grace,
            self.concurrent_limit.acquire_many(permits),
        )
        .await;

        match drained {
            Ok(Ok(_all)) => tracing::info!("All in-flight tasks finished"),
            Ok(Err(_)) => tracing::warn!("Concurrency limiter closed during shutdown"),
            Err(_) => tracing::warn!(
                active_tasks = self.active_tasks(),
                grace_secs = self.shutdown_grace.as_secs(),
                "Timeout waiting for in-flight tasks, proceeding with shutdown"
            ),
        }

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether shutdown has been requested
    pub fn is_shutting_down(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Process one message and acknowledge it unless processing failed
async fn handle_message(
    source: &dyn MessageSource,
    processor: &TaskProcessor,
    message: ReceivedMessage,
) {
    let message_id = message.message_id.as_deref().unwrap_or("-");

    match processor.process_message(&message).await {
        Ok(TaskOutcome::Completed(_)) | Ok(TaskOutcome::Skipped { .. }) => {
            let Some(token) = &message.token else {
                tracing::warn!(message_id, "Message has no delivery token, cannot acknowledge");
                return;
            };
            if let Err(e) = source.acknowledge(token).await {
                tracing::error!(
                    message_id,
                    error = %e,
                    "Failed to acknowledge message, it will be redelivered"
                );
            }
        }
        Err(e) => {
            // Already logged and reported by the processor
            tracing::debug!(
                message_id,
                code = e.error_code(),
                "Leaving message for redelivery"
            );
        }
    }
}

//! In-memory collaborators for driving the worker without AWS or a model provider

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use chunk_relay::store::object_key;
use chunk_relay::{
    DeliveryToken, DocumentId, LeaseError, LeaseExtender, MessageSource, NotificationPublisher,
    ObjectStore, OutboundNotification, QueueError, ReceivedMessage, StoreError, TextTransformer,
    TransformError,
};

/// Build a received message with a token derived from its id
pub fn message(id: &str, body: &str) -> ReceivedMessage {
    ReceivedMessage {
        message_id: Some(id.to_string()),
        body: body.to_string(),
        token: Some(DeliveryToken::new(format!("receipt-{id}"))),
    }
}

/// JSON body carrying `text`
pub fn text_body(text: &str) -> String {
    serde_json::json!({ "text": text }).to_string()
}

/// Input and output queue in one, recording every call
#[derive(Default)]
pub struct InMemoryQueue {
    pending: Mutex<VecDeque<ReceivedMessage>>,
    acked: Mutex<Vec<String>>,
    extended: Mutex<Vec<(String, Duration)>>,
    published: Mutex<Vec<OutboundNotification>>,
    receive_failures: AtomicUsize,
    receive_calls: AtomicUsize,
    requested: Mutex<Vec<usize>>,
    fail_publish: AtomicBool,
}

impl InMemoryQueue {
    /// Queue pre-loaded with messages
    pub fn with_messages(messages: Vec<ReceivedMessage>) -> Self {
        Self {
            pending: Mutex::new(messages.into()),
            ..Self::default()
        }
    }

    /// Make the next `n` receives fail with a transient error
    pub fn fail_next_receives(&self, n: usize) {
        self.receive_failures.store(n, Ordering::SeqCst);
    }

    /// Make every publish fail
    pub fn fail_publishes(&self) {
        self.fail_publish.store(true, Ordering::SeqCst);
    }

    /// Messages not yet received
    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// `max_messages` of every receive call, in order
    pub fn requested(&self) -> Vec<usize> {
        self.requested.lock().unwrap().clone()
    }

    /// Tokens acknowledged so far
    pub fn acked(&self) -> Vec<String> {
        self.acked.lock().unwrap().clone()
    }

    /// Lease extensions so far, as (token, duration)
    pub fn extended(&self) -> Vec<(String, Duration)> {
        self.extended.lock().unwrap().clone()
    }

    /// Notifications published so far
    pub fn published(&self) -> Vec<OutboundNotification> {
        self.published.lock().unwrap().clone()
    }

    /// Number of receive calls, failed ones included
    pub fn receive_calls(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MessageSource for InMemoryQueue {
    async fn receive(&self, max_messages: usize) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(max_messages);

        let failures = self.receive_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.receive_failures.store(failures - 1, Ordering::SeqCst);
            return Err(QueueError::Receive("connection reset by peer".to_string()));
        }

        let batch: Vec<_> = {
            let mut pending = self.pending.lock().unwrap();
            let n = pending.len().min(max_messages).min(10);
            pending.drain(..n).collect()
        };
        if batch.is_empty() {
            // stand-in for long polling
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(batch)
    }

    async fn acknowledge(&self, token: &DeliveryToken) -> Result<(), QueueError> {
        self.acked.lock().unwrap().push(token.expose().to_string());
        Ok(())
    }
}

#[async_trait::async_trait]
impl LeaseExtender for InMemoryQueue {
    async fn extend(&self, token: &DeliveryToken, duration: Duration) -> Result<(), LeaseError> {
        self.extended
            .lock()
            .unwrap()
            .push((token.expose().to_string(), duration));
        Ok(())
    }
}

#[async_trait::async_trait]
impl NotificationPublisher for InMemoryQueue {
    async fn publish(&self, notification: &OutboundNotification) -> Result<(), QueueError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(QueueError::Publish("output queue unavailable".to_string()));
        }
        self.published.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Object store that keeps records in memory under their real keys
#[derive(Default)]
pub struct InMemoryObjects {
    objects: Mutex<Vec<(String, DocumentId, String)>>,
}

impl InMemoryObjects {
    /// Stored (key, document id, processed text)
    pub fn objects(&self) -> Vec<(String, DocumentId, String)> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ObjectStore for InMemoryObjects {
    async fn put_record(
        &self,
        _original: &str,
        processed: &str,
        document_id: &DocumentId,
    ) -> Result<String, StoreError> {
        let key = object_key("processed_texts", document_id, Utc::now());
        self.objects
            .lock()
            .unwrap()
            .push((key.clone(), document_id.clone(), processed.to_string()));
        Ok(key)
    }
}

/// Uppercases chunks after an optional delay; can fail on chunks containing a marker
pub struct UppercaseTransformer {
    delay: Duration,
    fail_marker: Option<String>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl UppercaseTransformer {
    /// Transformer answering immediately
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// Transformer taking `delay` per chunk
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            fail_marker: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Fail any chunk containing `marker`
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Self::new()
        }
    }

    /// Highest number of concurrent transform calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TextTransformer for UppercaseTransformer {
    async fn transform(&self, chunk: &str) -> Result<String, TransformError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(marker) = &self.fail_marker
            && chunk.contains(marker.as_str())
        {
            return Err(TransformError::Http {
                status: 503,
                body: "model overloaded".to_string(),
            });
        }
        Ok(chunk.to_uppercase())
    }
}

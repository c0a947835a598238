//! Core types for chunk-relay

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Status recorded with every persisted result
pub const STATUS_COMPLETED: &str = "completed";

/// Identifier assigned to a processed document by the document store
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle the queue issued for one delivery of a message.
///
/// Only handed back to the queue (lease extension, acknowledgement); never
/// parsed. `Debug` does not print the value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DeliveryToken(String);

impl DeliveryToken {
    /// Wrap a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, for passing back to the queue
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for DeliveryToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeliveryToken(<{} bytes>)", self.0.len())
    }
}

/// A message as received from the input queue, before validation
#[derive(Clone, Debug)]
pub struct ReceivedMessage {
    /// Queue-assigned message id, for logging
    pub message_id: Option<String>,
    /// Raw message body
    pub body: String,
    /// Delivery token; absent only if the queue misbehaves
    pub token: Option<DeliveryToken>,
}

/// One validated unit of work
///
/// Only [`InboundTask::parse`] and [`InboundTask::from_message`] build one, so
/// the text is never empty and a delivery token is always present.
#[derive(Clone, Debug)]
pub struct InboundTask {
    message_id: Option<String>,
    text: String,
    token: DeliveryToken,
}

impl InboundTask {
    /// Validate a raw message body into a task.
    ///
    /// The body must be a JSON object whose `text` field is a non-empty
    /// string. Extra fields are ignored.
    pub fn parse(
        body: &str,
        token: Option<DeliveryToken>,
        message_id: Option<String>,
    ) -> Result<Self, ValidationError> {
        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| ValidationError::MalformedBody(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| ValidationError::MalformedBody("expected a JSON object".to_string()))?;

        let text = match object.get("text") {
            Some(serde_json::Value::String(text)) => text.clone(),
            _ => return Err(ValidationError::MissingText),
        };
        if text.is_empty() {
            return Err(ValidationError::EmptyText);
        }
        let token = token.ok_or(ValidationError::MissingDeliveryToken)?;

        Ok(Self {
            message_id,
            text,
            token,
        })
    }

    /// Validate a received queue message into a task
    pub fn from_message(message: &ReceivedMessage) -> Result<Self, ValidationError> {
        Self::parse(
            &message.body,
            message.token.clone(),
            message.message_id.clone(),
        )
    }

    /// Queue-assigned message id
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Text to transform; never empty
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Delivery token used for lease extension
    pub fn token(&self) -> &DeliveryToken {
        &self.token
    }

    /// Message id for log fields, `"-"` when the queue gave none
    pub fn log_id(&self) -> &str {
        self.message_id.as_deref().unwrap_or("-")
    }
}

/// The order-preserving join of every chunk result
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregatedResult {
    /// Chunk results joined with single spaces, in split order
    pub text: String,
    /// Number of chunks that were transformed
    pub chunk_count: usize,
    /// Status recorded with the result
    pub status: String,
    /// When aggregation finished
    pub completed_at: DateTime<Utc>,
}

impl AggregatedResult {
    /// Join chunk results in order
    pub fn from_chunks(results: Vec<String>) -> Self {
        Self {
            chunk_count: results.len(),
            text: results.join(" "),
            status: STATUS_COMPLETED.to_string(),
            completed_at: Utc::now(),
        }
    }
}

/// Row stored in the document store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Store-generated identifier
    pub id: DocumentId,
    /// Text as received
    pub original_text: String,
    /// Aggregated transform output
    pub processed_text: String,
    /// Write time (UTC)
    pub timestamp: DateTime<Utc>,
    /// Always [`STATUS_COMPLETED`] for rows written by the worker
    pub status: String,
}

/// JSON body written to the object store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Identifier from the document store
    pub document_id: DocumentId,
    /// Text as received
    pub original_text: String,
    /// Aggregated transform output
    pub processed_text: String,
    /// Compact write time, `YYYYMMDD_HHMMSS`
    pub timestamp: String,
    /// Always [`STATUS_COMPLETED`]
    pub status: String,
}

/// Message published to the output queue
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundNotification {
    /// Identifier from the document store
    pub document_id: DocumentId,
    /// Aggregated transform output
    pub processed_text: String,
    /// RFC 3339 timestamp, seconds precision
    pub timestamp: String,
}

impl OutboundNotification {
    /// Build a notification stamped with the given time
    pub fn new(document_id: DocumentId, processed_text: String, at: DateTime<Utc>) -> Self {
        Self {
            document_id,
            processed_text,
            timestamp: at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Compact timestamp used in object keys and bodies
pub fn compact_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Where the results of one task ended up
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Identifier assigned by the document store
    pub document_id: DocumentId,
    /// Key of the object store copy
    pub object_key: String,
    /// Number of chunks the text was split into
    pub chunk_count: usize,
}

/// Result of handling one message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    /// All chunks transformed and every result sink step succeeded
    Completed(CommitReceipt),
    /// Message carried nothing to process; acknowledged without side effects
    Skipped {
        /// Why the message was skipped
        reason: ValidationError,
    },
}

/// Event emitted during message processing
///
/// Subscribe via [`Worker::subscribe`](crate::worker::Worker::subscribe).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A task passed validation and was split
    TaskStarted {
        /// Queue message id
        message_id: Option<String>,
        /// Number of chunks
        total_chunks: usize,
    },
    /// One chunk came back from the transform provider
    ChunkTransformed {
        /// Queue message id
        message_id: Option<String>,
        /// Zero-based chunk index
        index: usize,
        /// Number of chunks
        total_chunks: usize,
    },
    /// Delivery lease was extended
    LeaseExtended {
        /// Queue message id
        message_id: Option<String>,
        /// Extension in seconds
        seconds: u64,
    },
    /// Delivery lease extension failed; processing continued
    LeaseExtensionFailed {
        /// Queue message id
        message_id: Option<String>,
        /// Failure description
        error: String,
    },
    /// Message was skipped without processing
    TaskSkipped {
        /// Queue message id
        message_id: Option<String>,
        /// Why it was skipped
        reason: String,
    },
    /// Every sink step succeeded
    TaskCompleted {
        /// Queue message id
        message_id: Option<String>,
        /// Identifier assigned by the document store
        document_id: DocumentId,
        /// Key of the object store copy
        object_key: String,
    },
    /// Task aborted; the message will be redelivered
    TaskFailed {
        /// Queue message id
        message_id: Option<String>,
        /// Machine-readable error code
        code: &'static str,
        /// Failure description
        error: String,
    },
}

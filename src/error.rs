//! Error types for chunk-relay
//!
//! This module provides the error stack shared by the task processor, the queue
//! consumer and the collaborator adapters:
//! - Domain-specific error types (validation, transform, lease, store, queue)
//! - Fatal vs. absorbed classification used by the consumer loop
//! - Stable machine-readable error codes for logs and events

use thiserror::Error;

/// Result type alias for chunk-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for chunk-relay
///
/// Each variant carries enough context to diagnose a failed task without
/// replaying it.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "MAX_PART_LENGTH")
        key: Option<String>,
    },

    /// A caller violated a function contract (e.g. a zero chunk length)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Inbound payload was malformed or had nothing to process
    #[error("invalid message: {0}")]
    Validation(#[from] ValidationError),

    /// Transforming one chunk of a multi-chunk task failed
    #[error("chunk {} of {total} failed: {source}", .index + 1)]
    ChunkFailed {
        /// Zero-based index of the chunk that failed
        index: usize,
        /// Number of chunks in the task
        total: usize,
        /// The underlying transform failure
        #[source]
        source: TransformError,
    },

    /// Document or object store write failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Queue operation failed (receive, acknowledge, publish)
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Database lifecycle error
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Shutdown in progress - not accepting new messages
    #[error("shutdown in progress: not accepting new messages")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Reasons an inbound message is rejected before any processing happens.
///
/// These never fail a task: the message is skipped and acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Body is not a JSON object
    #[error("message body is not a JSON object: {0}")]
    MalformedBody(String),

    /// No `text` field, or `text` is not a string
    #[error("message has no 'text' field")]
    MissingText,

    /// `text` is present but empty
    #[error("message 'text' field is empty")]
    EmptyText,

    /// Queue delivered the message without a delivery token
    #[error("message has no delivery token")]
    MissingDeliveryToken,
}

/// Transform provider failures
#[derive(Debug, Error)]
pub enum TransformError {
    /// Request could not be sent or the connection failed
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("provider returned status {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body, as returned by the provider
        body: String,
    },

    /// Provider response contained no completion
    #[error("provider returned no completion")]
    EmptyResponse,

    /// Provider response could not be decoded
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// Any other provider-specific failure (used by custom transformers)
    #[error("{0}")]
    Other(String),
}

/// Lease extension failures
#[derive(Debug, Clone, Error)]
pub enum LeaseError {
    /// Queue refused to change the message visibility
    #[error("visibility change rejected: {0}")]
    Rejected(String),

    /// Requested duration cannot be expressed by the queue
    #[error("invalid lease duration: {0} seconds")]
    InvalidDuration(u64),
}

/// Persistence failures in the document and object stores
#[derive(Debug, Error)]
pub enum StoreError {
    /// Document store insert failed
    #[error("document write failed: {0}")]
    DocumentWrite(String),

    /// Object store put failed
    #[error("object write failed for key {key}: {reason}")]
    ObjectWrite {
        /// Object key that was being written
        key: String,
        /// Underlying failure
        reason: String,
    },
}

/// Queue failures
#[derive(Debug, Error)]
pub enum QueueError {
    /// Receiving a batch from the input queue failed
    #[error("receive failed: {0}")]
    Receive(String),

    /// Deleting a processed message failed
    #[error("acknowledge failed: {0}")]
    Acknowledge(String),

    /// Sending the downstream notification failed
    #[error("publish failed: {0}")]
    Publish(String),
}

/// Database lifecycle errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to create or migrate the schema
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// Create a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error aborts the current task.
    ///
    /// Validation problems are absorbed as skips; everything else leaves the
    /// message for redelivery. Lease extension failures never reach this type,
    /// they are logged and reported as [`crate::Event::LeaseExtensionFailed`].
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Validation(_))
    }

    /// Machine-readable error code for logs and events
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::Validation(_) => "validation_error",
            Error::ChunkFailed { .. } => "chunk_failed",
            Error::Store(StoreError::DocumentWrite(_)) => "document_write_failed",
            Error::Store(StoreError::ObjectWrite { .. }) => "object_write_failed",
            Error::Queue(QueueError::Receive(_)) => "queue_receive_failed",
            Error::Queue(QueueError::Acknowledge(_)) => "queue_acknowledge_failed",
            Error::Queue(QueueError::Publish(_)) => "queue_publish_failed",
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}

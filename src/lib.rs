//! # chunk-relay
//!
//! Queue-driven worker that pushes long texts through a slow transformation
//! service chunk by chunk.
//!
//! ## Design Philosophy
//!
//! - **Lease-aware** - the queue delivery lease is extended between chunks so
//!   long tasks are not redelivered mid-flight
//! - **All-or-nothing per task** - a failed chunk aborts the task before
//!   anything is persisted; the queue's redelivery policy does the retrying
//! - **Injected collaborators** - every external system sits behind a trait
//!   ([`TextTransformer`], [`LeaseExtender`], [`DocumentStore`], [`ObjectStore`],
//!   [`NotificationPublisher`], [`MessageSource`])
//! - **Event-driven** - embedders subscribe to [`Event`]s instead of polling
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use chunk_relay::{
//!     Collaborators, Config, OpenAiTransformer, ProcessorSettings, ResultSink,
//!     S3ObjectStore, SqliteDocumentStore, SqsQueue, TaskProcessor, Worker, run_with_shutdown,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     config.validate()?;
//!
//!     let queue = Arc::new(SqsQueue::from_env(&config.queue).await);
//!     let sink = ResultSink::new(
//!         Arc::new(SqliteDocumentStore::open(&config.document_store).await?),
//!         Arc::new(S3ObjectStore::from_env(&config.object_store).await),
//!         queue.clone(),
//!     );
//!     let processor = TaskProcessor::new(
//!         ProcessorSettings::from(&config),
//!         Collaborators {
//!             transformer: Arc::new(OpenAiTransformer::new(&config.transform)?),
//!             lease: queue.clone(),
//!             sink,
//!         },
//!     );
//!
//!     let worker = Worker::new(queue, processor, &config);
//!     let mut events = worker.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     worker.start_consumer();
//!     run_with_shutdown(worker).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Length-bounded text splitting
pub mod chunking;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Per-message task processing
pub mod processor;
/// Queue collaborators (lease extension, receive/acknowledge, notifications)
pub mod queue;
/// Retry logic with exponential backoff
pub mod retry;
/// Sequential commit of aggregated results
pub mod sink;
/// Document and object stores
pub mod store;
/// Text transformation providers
pub mod transform;
/// Core types and events
pub mod types;
/// Queue consumer loop
pub mod worker;

// Re-export commonly used types
pub use chunking::{chunk_count, split_text};
pub use config::Config;
pub use error::{
    DatabaseError, Error, LeaseError, QueueError, Result, StoreError, TransformError,
    ValidationError,
};
pub use processor::{Collaborators, ProcessorSettings, TaskPhase, TaskProcessor};
pub use queue::{LeaseExtender, MessageSource, NotificationPublisher, SqsQueue};
pub use sink::ResultSink;
pub use store::{DocumentStore, ObjectStore, S3ObjectStore, SqliteDocumentStore};
pub use transform::{OpenAiTransformer, TextTransformer};
pub use types::{
    AggregatedResult, CommitReceipt, DeliveryToken, DocumentId, Event, InboundTask,
    OutboundNotification, ReceivedMessage, TaskOutcome,
};
pub use worker::Worker;

/// Helper function to run the worker with graceful signal handling.
///
/// Waits for a termination signal and then calls the worker's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(worker: Worker) -> Result<()> {
    wait_for_signal().await;
    worker.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}

//! Task processor: runs one inbound message through split, transform, lease
//! extension and commit.
//!
//! Split into focused submodules:
//! - [`orchestration`] - Per-task lifecycle: validation, the sequential chunk loop, commit

mod orchestration;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::queue::LeaseExtender;
use crate::sink::ResultSink;
use crate::transform::TextTransformer;
use crate::types::Event;

/// Tunables for one processor instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessorSettings {
    /// Maximum chunk length in characters
    pub max_chunk_len: usize,
    /// Lease granted by each extension
    pub lease_extension: Duration,
    /// Pause between consecutive chunks
    pub inter_chunk_delay: Duration,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ProcessorSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_chunk_len: config.processing.max_chunk_len,
            lease_extension: config.queue.visibility_extension,
            inter_chunk_delay: config.processing.inter_chunk_delay,
        }
    }
}

/// External capabilities the processor depends on
#[derive(Clone)]
pub struct Collaborators {
    /// Transforms one chunk
    pub transformer: Arc<dyn TextTransformer>,
    /// Extends the delivery lease between chunks
    pub lease: Arc<dyn LeaseExtender>,
    /// Commits the aggregated result
    pub sink: ResultSink,
}

/// Where a task currently is; logged on every transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskPhase {
    /// Splitting the text into chunks
    Splitting,
    /// Waiting on the transform provider for chunk `index`
    ProcessingChunk {
        /// Zero-based chunk index
        index: usize,
    },
    /// Extending the lease after chunk `index`
    ExtendingLease {
        /// Zero-based index of the chunk just finished
        index: usize,
    },
    /// Joining chunk results
    Aggregating,
    /// Writing document and object copies, then publishing the notification
    Committing,
    /// Every step succeeded
    Done,
    /// A fatal error ended the task
    Aborted,
}

impl std::fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPhase::Splitting => f.write_str("splitting"),
            TaskPhase::ProcessingChunk { index } => write!(f, "processing_chunk({index})"),
            TaskPhase::ExtendingLease { index } => write!(f, "extending_lease({index})"),
            TaskPhase::Aggregating => f.write_str("aggregating"),
            TaskPhase::Committing => f.write_str("committing"),
            TaskPhase::Done => f.write_str("done"),
            TaskPhase::Aborted => f.write_str("aborted"),
        }
    }
}

/// Processes inbound messages one at a time.
///
/// Holds no per-task state, so one instance can serve many concurrent tasks.
#[derive(Clone)]
pub struct TaskProcessor {
    settings: ProcessorSettings,
    collaborators: Collaborators,
    event_tx: Option<broadcast::Sender<Event>>,
}

impl std::fmt::Debug for TaskProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskProcessor")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TaskProcessor {
    /// Create a processor
    pub fn new(settings: ProcessorSettings, collaborators: Collaborators) -> Self {
        Self {
            settings,
            collaborators,
            event_tx: None,
        }
    }

    /// Emit progress events on `tx`
    pub fn with_events(mut self, tx: broadcast::Sender<Event>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Current settings
    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    fn emit(&self, event: Event) {
        if let Some(tx) = &self.event_tx {
            // no subscribers is fine
            tx.send(event).ok();
        }
    }
}

//! Task orchestration: top-level lifecycle for a single inbound message.

use crate::chunking::split_text;
use crate::error::{Error, Result, ValidationError};
use crate::types::{
    AggregatedResult, CommitReceipt, Event, InboundTask, ReceivedMessage, TaskOutcome,
};

use super::{TaskPhase, TaskProcessor};

impl TaskProcessor {
    /// Parse and process one received message.
    ///
    /// Messages without usable text are skipped: the outcome is
    /// [`TaskOutcome::Skipped`] and no collaborator is called. Every other
    /// failure is returned as an error so the message is left for redelivery.
    pub async fn process_message(&self, message: &ReceivedMessage) -> Result<TaskOutcome> {
        match InboundTask::from_message(message) {
            Ok(task) => self.process(task).await.map(TaskOutcome::Completed),
            Err(reason) => Ok(self.skip(message.message_id.clone(), reason)),
        }
    }

    /// Process one validated task.
    ///
    /// A task always carries non-empty text; empty messages never get this far
    /// and are skipped by [`TaskProcessor::process_message`].
    ///
    /// Phases:
    /// 1. Split the text into chunks
    /// 2. Transform each chunk in order, extending the lease and pausing between chunks
    /// 3. Join the chunk results
    /// 4. Commit through the result sink
    ///
    /// A transform failure aborts the task before anything is committed.
    /// Lease extension failures are logged and otherwise ignored.
    pub async fn process(&self, task: InboundTask) -> Result<CommitReceipt> {
        match self.run(&task).await {
            Ok(receipt) => {
                tracing::info!(
                    message_id = task.log_id(),
                    document_id = %receipt.document_id,
                    object_key = %receipt.object_key,
                    total_chunks = receipt.chunk_count,
                    "Task completed"
                );
                self.emit(Event::TaskCompleted {
                    message_id: task.message_id().map(str::to_owned),
                    document_id: receipt.document_id.clone(),
                    object_key: receipt.object_key.clone(),
                });
                Ok(receipt)
            }
            Err(e) => {
                self.enter(&task, TaskPhase::Aborted);
                tracing::error!(
                    message_id = task.log_id(),
                    code = e.error_code(),
                    error = %e,
                    "Task failed"
                );
                self.emit(Event::TaskFailed {
                    message_id: task.message_id().map(str::to_owned),
                    code: e.error_code(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run(&self, task: &InboundTask) -> Result<CommitReceipt> {
        // Phase 1: Split
        self.enter(task, TaskPhase::Splitting);
        let chunks = split_text(task.text(), self.settings.max_chunk_len)?;
        let total = chunks.len();

        tracing::info!(
            message_id = task.log_id(),
            total_chunks = total,
            text_chars = task.text().chars().count(),
            "Processing task"
        );
        self.emit(Event::TaskStarted {
            message_id: task.message_id().map(str::to_owned),
            total_chunks: total,
        });

        // Phase 2: Transform chunks sequentially
        let results = self.transform_chunks(task, &chunks).await?;

        // Phase 3: Aggregate
        self.enter(task, TaskPhase::Aggregating);
        let aggregated = AggregatedResult::from_chunks(results);

        // Phase 4: Commit
        self.enter(task, TaskPhase::Committing);
        let receipt = self
            .collaborators
            .sink
            .commit(task.text(), &aggregated)
            .await?;

        self.enter(task, TaskPhase::Done);
        Ok(receipt)
    }

    async fn transform_chunks(&self, task: &InboundTask, chunks: &[&str]) -> Result<Vec<String>> {
        let total = chunks.len();
        let mut results = Vec::with_capacity(total);

        for (index, chunk) in chunks.iter().enumerate() {
            self.enter(task, TaskPhase::ProcessingChunk { index });

            let output = self
                .collaborators
                .transformer
                .transform(chunk)
                .await
                .map_err(|source| {
                    tracing::error!(
                        message_id = task.log_id(),
                        chunk_index = index,
                        total_chunks = total,
                        error = %source,
                        "Chunk transform failed"
                    );
                    Error::ChunkFailed {
                        index,
                        total,
                        source,
                    }
                })?;

            tracing::info!(
                message_id = task.log_id(),
                chunk_index = index,
                total_chunks = total,
                "Chunk transformed"
            );
            results.push(output);
            self.emit(Event::ChunkTransformed {
                message_id: task.message_id().map(str::to_owned),
                index,
                total_chunks: total,
            });

            if index + 1 < total {
                self.extend_lease(task, index).await;
                if !self.settings.inter_chunk_delay.is_zero() {
                    tokio::time::sleep(self.settings.inter_chunk_delay).await;
                }
            }
        }

        Ok(results)
    }

    async fn extend_lease(&self, task: &InboundTask, index: usize) {
        self.enter(task, TaskPhase::ExtendingLease { index });
        let duration = self.settings.lease_extension;

        match self.collaborators.lease.extend(task.token(), duration).await {
            Ok(()) => {
                tracing::info!(
                    message_id = task.log_id(),
                    chunk_index = index,
                    seconds = duration.as_secs(),
                    "Extended delivery lease"
                );
                self.emit(Event::LeaseExtended {
                    message_id: task.message_id().map(str::to_owned),
                    seconds: duration.as_secs(),
                });
            }
            Err(e) => {
                tracing::warn!(
                    message_id = task.log_id(),
                    chunk_index = index,
                    error = %e,
                    "Lease extension failed, continuing with current lease"
                );
                self.emit(Event::LeaseExtensionFailed {
                    message_id: task.message_id().map(str::to_owned),
                    error: e.to_string(),
                });
            }
        }
    }

    fn skip(&self, message_id: Option<String>, reason: ValidationError) -> TaskOutcome {
        tracing::info!(
            message_id = message_id.as_deref().unwrap_or("-"),
            reason = %reason,
            "Skipping message"
        );
        self.emit(Event::TaskSkipped {
            message_id,
            reason: reason.to_string(),
        });
        TaskOutcome::Skipped { reason }
    }

    fn enter(&self, task: &InboundTask, phase: TaskPhase) {
        tracing::debug!(message_id = task.log_id(), phase = %phase, "Task phase");
    }
}

//! Result sink: the three commit steps run after a task's chunks all succeed.

use std::sync::Arc;

use chrono::Utc;

use crate::error::Result;
use crate::queue::NotificationPublisher;
use crate::store::{DocumentStore, ObjectStore};
use crate::types::{AggregatedResult, CommitReceipt, OutboundNotification};

/// Commits one aggregated result: document store, then object store, then notification.
///
/// Each step must succeed before the next starts. There is no rollback; a
/// failure after the document write leaves that document in place.
#[derive(Clone)]
pub struct ResultSink {
    documents: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    notifier: Arc<dyn NotificationPublisher>,
}

impl std::fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSink").finish_non_exhaustive()
    }
}

impl ResultSink {
    /// Create a sink over the three collaborators
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        objects: Arc<dyn ObjectStore>,
        notifier: Arc<dyn NotificationPublisher>,
    ) -> Self {
        Self {
            documents,
            objects,
            notifier,
        }
    }

    /// Write both copies of the result and publish the notification
    pub async fn commit(&self, original: &str, result: &AggregatedResult) -> Result<CommitReceipt> {
        let document_id = self.documents.insert(original, &result.text).await?;
        tracing::info!(document_id = %document_id, "Stored processed document");

        let object_key = self
            .objects
            .put_record(original, &result.text, &document_id)
            .await?;
        tracing::info!(document_id = %document_id, object_key = %object_key, "Stored result object");

        let notification =
            OutboundNotification::new(document_id.clone(), result.text.clone(), Utc::now());
        self.notifier.publish(&notification).await?;
        tracing::info!(document_id = %document_id, "Published result notification");

        Ok(CommitReceipt {
            document_id,
            object_key,
            chunk_count: result.chunk_count,
        })
    }
}

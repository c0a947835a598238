//! Amazon S3 object store.

use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};

use crate::config::ObjectStoreConfig;
use crate::error::StoreError;
use crate::types::{DocumentId, ObjectRecord, STATUS_COMPLETED, compact_timestamp};

use super::ObjectStore;

/// Writes one JSON object per document under `{prefix}/`
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    key_prefix: String,
}

impl S3ObjectStore {
    /// Create a store with a pre-built S3 client
    pub fn new(client: Client, config: &ObjectStoreConfig) -> Self {
        Self {
            client,
            bucket: config.bucket.clone(),
            key_prefix: config.key_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Create a store using the standard AWS SDK config chain
    pub async fn from_env(config: &ObjectStoreConfig) -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&sdk_config), config)
    }

    /// Target bucket
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Object key for a document written at `at`
///
/// `{prefix}/{document_id}_{YYYYMMDD_HHMMSS}.json`
pub fn object_key(prefix: &str, document_id: &DocumentId, at: DateTime<Utc>) -> String {
    format!(
        "{}/{}_{}.json",
        prefix.trim_end_matches('/'),
        document_id,
        compact_timestamp(at)
    )
}

/// Key and record for one write; the record timestamp matches the key
fn build_record(
    prefix: &str,
    original: &str,
    processed: &str,
    document_id: &DocumentId,
    at: DateTime<Utc>,
) -> (String, ObjectRecord) {
    let key = object_key(prefix, document_id, at);
    let record = ObjectRecord {
        document_id: document_id.clone(),
        original_text: original.to_string(),
        processed_text: processed.to_string(),
        timestamp: compact_timestamp(at),
        status: STATUS_COMPLETED.to_string(),
    };
    (key, record)
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_record(
        &self,
        original: &str,
        processed: &str,
        document_id: &DocumentId,
    ) -> Result<String, StoreError> {
        let (key, record) =
            build_record(&self.key_prefix, original, processed, document_id, Utc::now());

        let body = serde_json::to_vec(&record).map_err(|e| StoreError::ObjectWrite {
            key: key.clone(),
            reason: format!("failed to encode record: {e}"),
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("application/json")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StoreError::ObjectWrite {
                key: key.clone(),
                reason: DisplayErrorContext(e).to_string(),
            })?;

        Ok(key)
    }
}

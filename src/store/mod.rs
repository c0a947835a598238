//! Persistence collaborators
//!
//! - [`document`] - SQLite document store (sqlx); generates document ids
//! - [`object`] - S3 object store; writes one JSON record per document
//!
//! The two stores are written independently and are not transactionally
//! linked: a document row can exist without its object copy if the second
//! write fails.

use crate::error::StoreError;
use crate::types::DocumentId;

pub mod document;
pub mod object;

pub use document::SqliteDocumentStore;
pub use object::{S3ObjectStore, object_key};

/// Stores processed documents and assigns their identifiers
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a completed document and return its fresh identifier
    async fn insert(&self, original: &str, processed: &str) -> Result<DocumentId, StoreError>;
}

/// Stores the JSON copy of a processed document
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write the record and return the key it was stored under
    async fn put_record(
        &self,
        original: &str,
        processed: &str,
        document_id: &DocumentId,
    ) -> Result<String, StoreError>;
}

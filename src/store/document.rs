//! SQLite document store.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use sqlx::{FromRow, Row};
use std::str::FromStr;

use crate::config::{DocumentStoreConfig, is_sql_identifier};
use crate::error::{DatabaseError, Error, Result, StoreError};
use crate::types::{DocumentId, DocumentRecord, STATUS_COMPLETED};

use super::DocumentStore;

/// Document store backed by one SQLite table (the "collection")
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    table: String,
}

#[derive(FromRow)]
struct DocumentRow {
    id: String,
    original_text: String,
    processed_text: String,
    timestamp: i64,
    status: String,
}

impl SqliteDocumentStore {
    /// Open (creating if needed) the database and collection from configuration
    pub async fn open(config: &DocumentStoreConfig) -> Result<Self> {
        let uri = config.connection_uri();
        let options = SqliteConnectOptions::from_str(&uri)
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse connection string {uri}: {e}"
                )))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to document store: {e}"
            )))
        })?;

        Self::with_pool(pool, &config.collection_name).await
    }

    /// Use an existing pool; creates the collection table if missing
    pub async fn with_pool(pool: SqlitePool, collection: &str) -> Result<Self> {
        if !is_sql_identifier(collection) {
            return Err(Error::config(
                "DOCUMENT_STORE_COLLECTION_NAME",
                format!("{collection:?} is not a valid collection name"),
            ));
        }

        let store = Self {
            pool,
            table: collection.to_string(),
        };
        store.create_schema().await?;
        Ok(store)
    }

    async fn create_schema(&self) -> Result<()> {
        tracing::debug!(collection = %self.table, "Ensuring document collection exists");

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY NOT NULL,
                original_text TEXT NOT NULL,
                processed_text TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                status TEXT NOT NULL
            )
            "#,
            self.table
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create collection {}: {e}",
                self.table
            )))
        })?;

        Ok(())
    }

    /// Fetch a document by id
    pub async fn get(&self, id: &DocumentId) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT id, original_text, processed_text, timestamp, status FROM {} WHERE id = ?",
            self.table
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        row.map(DocumentRow::into_record).transpose()
    }

    /// Number of stored documents
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", self.table))
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Sqlx)?;
        Ok(row.get::<i64, _>("n"))
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl DocumentRow {
    fn into_record(self) -> Result<DocumentRecord> {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(self.timestamp).ok_or_else(|| {
            Error::Other(format!(
                "document {} has out-of-range timestamp {}",
                self.id, self.timestamp
            ))
        })?;

        Ok(DocumentRecord {
            id: DocumentId(self.id),
            original_text: self.original_text,
            processed_text: self.processed_text,
            timestamp,
            status: self.status,
        })
    }
}

#[async_trait::async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn insert(
        &self,
        original: &str,
        processed: &str,
    ) -> std::result::Result<DocumentId, StoreError> {
        let id = DocumentId::generate();

        sqlx::query(&format!(
            r#"
            INSERT INTO {} (id, original_text, processed_text, timestamp, status)
            VALUES (?, ?, ?, ?, ?)
            "#,
            self.table
        ))
        .bind(id.as_str())
        .bind(original)
        .bind(processed)
        .bind(Utc::now().timestamp_millis())
        .bind(STATUS_COMPLETED)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::DocumentWrite(e.to_string()))?;

        Ok(id)
    }
}

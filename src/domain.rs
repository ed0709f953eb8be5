use crate::errors::{RepoError, StorageError};
use crate::models::MessageRecord;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;

/// Trait defining operations for storing and retrieving message records.
#[async_trait]
pub trait MessageRepository: Send + Sync + 'static { // Send+Sync+'static required for Arc<dyn>
    /// Stores a record under its `id`.
    async fn put(&self, record: &MessageRecord) -> Result<(), RepoError>;

    /// Retrieves a record by its identifier.
    /// Returns Ok(None) if the record is not found.
    async fn get(&self, id: &str) -> Result<Option<MessageRecord>, RepoError>;

    /// Deletes a record. Deleting a missing record succeeds.
    async fn delete(&self, id: &str) -> Result<(), RepoError>;

    /// Lists records whose validity window ended at or before `now_millis`.
    async fn list_expired(&self, now_millis: i64) -> Result<Vec<MessageRecord>, RepoError>;
}

/// Trait defining operations for storing and retrieving image blobs.
#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    /// Uploads file data to the storage backend.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError>;

    /// Downloads file data and its stored content type.
    async fn download(&self, key: &str) -> Result<(ByteStream, Option<String>), StorageError>;

    /// Deletes a blob. Deleting a missing blob succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Source of the current time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync + 'static {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

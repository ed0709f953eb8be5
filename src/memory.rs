//! Process-local backends. Nothing here survives a restart or scales past one
//! instance; they exist for local development (`STORAGE_BACKEND=memory`) and tests.

use crate::{
    domain::{FileStorage, MessageRepository},
    errors::{RepoError, StorageError},
    models::MessageRecord,
};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryMessageRepository {
    records: RwLock<HashMap<String, MessageRecord>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn put(&self, record: &MessageRecord) -> Result<(), RepoError> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<MessageRecord>, RepoError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<(), RepoError> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn list_expired(&self, now_millis: i64) -> Result<Vec<MessageRecord>, RepoError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.is_expired_at(now_millis))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryFileStorage {
    blobs: RwLock<HashMap<String, (Vec<u8>, Option<String>)>>,
}

impl InMemoryFileStorage {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn contains(&self, key: &str) -> bool {
        self.blobs.read().await.contains_key(key)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }
}

#[async_trait]
impl FileStorage for InMemoryFileStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError> {
        self.blobs
            .write()
            .await
            .insert(key.to_string(), (data, content_type));
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<(ByteStream, Option<String>), StorageError> {
        let blobs = self.blobs.read().await;
        let (data, content_type) = blobs
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok((ByteStream::from(data.clone()), content_type.clone()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.blobs.write().await.remove(key);
        Ok(())
    }
}

/// Clock whose time only moves when a test says so.
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::atomic::AtomicI64,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self { now: std::sync::atomic::AtomicI64::new(start_millis) }
    }

    pub fn advance_secs(&self, secs: i64) {
        self.now
            .fetch_add(secs * 1000, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl crate::domain::Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(std::sync::atomic::Ordering::SeqCst)
    }
}

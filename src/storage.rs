use crate::{
    domain::FileStorage,
    errors::StorageError,
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::{
    primitives::ByteStream,
    Client as S3Client,
    error::SdkError,
};
use tracing;

/// Image blobs in a single S3 bucket, keyed `<message id>-<file name>`.
#[derive(Debug, Clone)]
pub struct S3FileStorage {
    client: S3Client,
    bucket_name: String,
}

impl S3FileStorage {
    pub fn new(client: S3Client, bucket_name: String) -> Self {
        Self { client, bucket_name }
    }
}

#[async_trait]
impl FileStorage for S3FileStorage {
    /// Stores an image blob with its content type.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError> {
        let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, %content_type, size = data.len(), "S3: Storing image blob");

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .context(format!("S3: Failed to store image blob '{}'", key))
            .map_err(|e| StorageError::UploadFailed(format!("{:#}", e)))?;

        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Image blob stored");
        Ok(())
    }

    /// Fetches an image blob and the content type it was stored with.
    async fn download(&self, key: &str) -> Result<(ByteStream, Option<String>), StorageError> {
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Fetching image blob");

        let output = self.client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|sdk_err| {
                if let SdkError::ServiceError(service_err) = &sdk_err {
                    if service_err.err().is_no_such_key() {
                        tracing::warn!(s3_key = %key, bucket = %self.bucket_name, "S3: Image blob missing");
                        return StorageError::NotFound(key.to_string());
                    }
                }
                tracing::error!(s3_key = %key, bucket = %self.bucket_name, error = %sdk_err, "S3: Error fetching image blob");
                StorageError::BackendError(anyhow::Error::new(sdk_err).context(format!("S3: Failed to fetch image blob '{}'", key)))
            })?;

        let content_type = output.content_type().map(|s| s.to_string());
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, ?content_type, "S3: Image blob fetched");

        Ok((output.body, content_type))
    }

    /// Removes an image blob. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Removing image blob");

        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|sdk_err| {
                // DeleteObject succeeds for missing keys, so anything here is a real backend fault.
                tracing::error!(s3_key = %key, bucket = %self.bucket_name, error = %sdk_err, "S3: Error removing image blob");
                StorageError::BackendError(anyhow::Error::new(sdk_err).context(format!("S3: Failed to remove image blob '{}'", key)))
            })?;

        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Image blob removed");
        Ok(())
    }
}

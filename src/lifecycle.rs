use crate::{
    config::{Config, ALLOWED_IMAGE_CONTENT_TYPES, DEFAULT_DISPLAY_TIME_SECS},
    domain::{Clock, FileStorage, MessageRepository},
    errors::{AppError, StorageError},
    models::MessageRecord,
};
use std::sync::Arc;
use tracing;
use uuid::Uuid;

/// Raw fields of a create request, before validation.
#[derive(Debug, Default)]
pub struct Submission {
    pub message: Option<String>,
    pub image: Option<ImageUpload>,
    pub display_time: Option<String>,
}

#[derive(Debug)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    /// Content type declared by the multipart part, if any.
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Outcome of reading a record by id.
#[derive(Debug)]
pub enum Lookup {
    Active(MessageRecord),
    /// The record was past its window and has been purged by this read.
    Expired,
    Missing,
}

/// Create / read / purge logic shared by the HTTP handlers and the reaper.
#[derive(Clone)]
pub struct MessageLifecycle {
    repo: Arc<dyn MessageRepository>,
    storage: Arc<dyn FileStorage>,
    clock: Arc<dyn Clock>,
    config: Arc<Config>,
}

impl MessageLifecycle {
    pub fn new(
        repo: Arc<dyn MessageRepository>,
        storage: Arc<dyn FileStorage>,
        clock: Arc<dyn Clock>,
        config: Arc<Config>,
    ) -> Self {
        Self { repo, storage, clock, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validates a submission, stores its image (if any) and then its record.
    pub async fn create(&self, submission: Submission) -> Result<MessageRecord, AppError> {
        let message = submission.message.filter(|m| !m.is_empty());
        let image = submission.image.filter(|i| !i.data.is_empty());
        if message.is_none() && image.is_none() {
            return Err(AppError::MissingContent);
        }

        // Resolve the content type before anything is written.
        let image = match image {
            Some(upload) => {
                let content_type = allowed_image_content_type(
                    upload.content_type.as_deref(),
                    upload.file_name.as_deref(),
                )?;
                Some((upload, content_type))
            }
            None => None,
        };

        let id = Uuid::new_v4().to_string();
        let display_time = resolve_display_time(submission.display_time.as_deref());

        let mut image_path = None;
        if let Some((upload, content_type)) = image {
            let key = blob_key(&id, upload.file_name.as_deref(), &content_type);
            tracing::debug!(message_id = %id, blob_key = %key, %content_type, "Storing image");
            self.storage
                .upload(&key, upload.data, Some(content_type))
                .await?;
            image_path = Some(key);
        }

        let record = MessageRecord {
            id: id.clone(),
            message,
            image_url: image_path.as_deref().map(|key| self.config.image_url(key)),
            image_path,
            created_at: self.clock.now_millis(),
            display_time,
        };

        if let Err(e) = self.repo.put(&record).await {
            if let Some(key) = &record.image_path {
                tracing::warn!(message_id = %id, blob_key = %key, "Record write failed after image upload; blob is orphaned");
            }
            return Err(e.into());
        }

        tracing::info!(message_id = %id, display_time, has_image = record.image_path.is_some(), "Message created");
        Ok(record)
    }

    /// Reads a record, purging it when its window has closed.
    pub async fn lookup(&self, id: &str) -> Result<Lookup, AppError> {
        let Some(record) = self.repo.get(id).await? else {
            tracing::debug!(message_id = %id, "Message not found");
            return Ok(Lookup::Missing);
        };

        let now = self.clock.now_millis();
        if record.is_expired_at(now) {
            tracing::info!(message_id = %id, elapsed_ms = now - record.created_at, "Message expired on read");
            self.purge(&record).await?;
            return Ok(Lookup::Expired);
        }

        Ok(Lookup::Active(record))
    }

    /// Deletes the blob first, then the record. A failed blob delete leaves the
    /// record in place so a later read or sweep retries the whole purge.
    pub async fn purge(&self, record: &MessageRecord) -> Result<(), AppError> {
        if let Some(key) = &record.image_path {
            match self.storage.delete(key).await {
                Ok(()) | Err(StorageError::NotFound(_)) => {}
                Err(e) => {
                    tracing::error!(message_id = %record.id, blob_key = %key, error = %e, "Failed to delete image; keeping record for retry");
                    return Err(e.into());
                }
            }
        }
        self.repo.delete(&record.id).await?;
        tracing::debug!(message_id = %record.id, "Message purged");
        Ok(())
    }

    /// Purges every record whose window has closed. Returns how many were removed.
    pub async fn sweep_expired(&self) -> Result<usize, AppError> {
        let now = self.clock.now_millis();
        let expired = self.repo.list_expired(now).await?;
        let mut purged = 0;
        for record in &expired {
            match self.purge(record).await {
                Ok(()) => purged += 1,
                Err(e) => {
                    tracing::warn!(message_id = %record.id, error = %e, "Skipping message that failed to purge");
                }
            }
        }
        Ok(purged)
    }

    /// Streams an image while its owning record is still active.
    pub async fn open_image(
        &self,
        key: &str,
    ) -> Result<(aws_sdk_s3::primitives::ByteStream, Option<String>), AppError> {
        let id = owner_id(key).ok_or_else(|| AppError::ImageNotFound(key.to_string()))?;
        match self.lookup(id).await? {
            Lookup::Active(record) if record.image_path.as_deref() == Some(key) => {
                Ok(self.storage.download(key).await?)
            }
            Lookup::Active(_) | Lookup::Missing => Err(AppError::ImageNotFound(key.to_string())),
            Lookup::Expired => Err(AppError::MessageExpired(id.to_string())),
        }
    }
}

/// `displayTime` in seconds; absent, non-numeric and non-positive values fall back to the default.
pub fn resolve_display_time(raw: Option<&str>) -> i64 {
    raw.and_then(leading_integer)
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_DISPLAY_TIME_SECS)
}

/// Longest `[+-]?[0-9]+` prefix after leading whitespace, so `"2.5"` reads as 2
/// and `"5s"` as 5. Overflow saturates.
fn leading_integer(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let digits = &rest[..end];
    if digits.is_empty() {
        return None;
    }
    let value = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -value } else { value })
}

/// Declared content type (parameters stripped), else a guess from the file name,
/// checked against the allow-list.
pub fn allowed_image_content_type(
    declared: Option<&str>,
    file_name: Option<&str>,
) -> Result<String, AppError> {
    let declared = declared
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream");
    let content_type = declared
        .or_else(|| {
            file_name
                .and_then(|name| mime_guess::from_path(name).first_raw())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    if ALLOWED_IMAGE_CONTENT_TYPES.contains(&content_type.as_str()) {
        Ok(content_type)
    } else {
        Err(AppError::UnsupportedImageType(content_type))
    }
}

/// `<id>-<file name>`, with the file name reduced to a safe single path segment.
pub fn blob_key(id: &str, file_name: Option<&str>, content_type: &str) -> String {
    let base = file_name
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .unwrap_or("");
    let sanitized: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');

    if sanitized.is_empty() {
        let extension = if content_type == "image/png" { "png" } else { "jpg" };
        format!("{}-image.{}", id, extension)
    } else {
        format!("{}-{}", id, sanitized)
    }
}

/// Message id a blob key was derived from.
pub fn owner_id(key: &str) -> Option<&str> {
    let id = key.get(..36)?;
    if Uuid::parse_str(id).is_ok() && key[36..].starts_with('-') {
        Some(id)
    } else {
        None
    }
}

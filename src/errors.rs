use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use aws_smithy_types::error::operation::BuildError as SmithyBuildError;
use thiserror::Error;

// --- Domain/Infrastructure Errors ---

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("Database backend error: {0:#}")]
    BackendError(#[from] anyhow::Error), // Wrap Anyhow errors from DB layer

    #[error("Stored message data is corrupt: {0}")]
    DataCorruption(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File upload failed: {0}")]
    UploadFailed(String),

    #[error("File not found with key: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0:#}")]
    BackendError(#[from] anyhow::Error), // Wrap Anyhow errors from Storage layer
}

// --- Web Layer Error ---

#[derive(Error, Debug)]
pub enum AppError {
    // Input validation / request parsing errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("A message or an image is required")]
    MissingContent,
    #[error("Unsupported image type: {0}")]
    UnsupportedImageType(String),
    #[error("Missing query parameter: {0}")]
    MissingQueryParam(String),
    #[error("Error processing multipart form data: {0}")]
    MultipartError(#[from] axum::extract::multipart::MultipartError),

    // Lifecycle outcomes
    #[error("Message not found with ID: {0}")]
    MessageNotFound(String),
    #[error("Message has expired: {0}")]
    MessageExpired(String),
    #[error("Image not found: {0}")]
    ImageNotFound(String),

    // Domain/Service level errors (mapped from RepoError/StorageError)
    #[error("Message store operation failed: {0}")]
    RepositoryError(#[source] RepoError),
    #[error("File storage operation failed: {0}")]
    StorageError(#[source] StorageError),

    // Configuration / Startup errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Initialization error: {0}")]
    InitError(String),

    // Generic Internal Server Error
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

// --- Conversions from Domain Errors to AppError ---

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        AppError::RepositoryError(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::ImageNotFound(key),
            e => AppError::StorageError(e),
        }
    }
}

// Extractor rejections carry plain-text bodies; route them through the JSON error shape.
impl From<axum::extract::multipart::MultipartRejection> for AppError {
    fn from(rejection: axum::extract::multipart::MultipartRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for AppError {
    fn from(rejection: axum::extract::rejection::QueryRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<SmithyBuildError> for AppError {
    fn from(err: SmithyBuildError) -> Self {
        AppError::InitError(format!("Failed to build AWS request: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalServerError(format!("IO error: {}", err))
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_)
            | AppError::MissingContent
            | AppError::UnsupportedImageType(_)
            | AppError::MissingQueryParam(_) => StatusCode::BAD_REQUEST,
            // Oversized bodies come through here as 413.
            AppError::MultipartError(e) => e.status(),
            AppError::MessageNotFound(_) | AppError::ImageNotFound(_) => StatusCode::NOT_FOUND,
            AppError::MessageExpired(_) => StatusCode::GONE,
            AppError::RepositoryError(_)
            | AppError::StorageError(_)
            | AppError::ConfigError(_)
            | AppError::InitError(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// --- Axum Response Implementation ---

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Backend faults surface their underlying message to the caller.
        let error_message = self.to_string();

        if status.is_server_error() {
            tracing::error!(error.message = %error_message, error.status = %status, "Responding with error");
        } else {
            tracing::debug!(error.message = %error_message, error.status = %status, "Responding with error");
        }

        let body = Json(serde_json::json!({ "error": error_message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(AppError::MissingContent.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::UnsupportedImageType("image/gif".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::MissingQueryParam("id".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::MessageNotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::MessageExpired("x".into()).status(), StatusCode::GONE);
        assert_eq!(
            AppError::from(RepoError::BackendError(anyhow::anyhow!("throttled"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn storage_not_found_maps_to_image_not_found() {
        let err = AppError::from(StorageError::NotFound("abc.png".into()));
        assert!(matches!(err, AppError::ImageNotFound(ref k) if k == "abc.png"));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn server_errors_surface_backend_message() {
        let err = AppError::from(StorageError::BackendError(
            anyhow::anyhow!("bucket gone").context("S3: Failed to upload"),
        ));
        let text = err.to_string();
        assert!(text.contains("S3: Failed to upload"));
        assert!(text.contains("bucket gone"));
    }
}

use crate::{
    errors::{AppError, StorageError},
    lifecycle::{ImageUpload, Lookup, Submission},
    models::CreatedMessage,
    AppState,
};
use axum::{
    body::Body,
    extract::{
        multipart::MultipartRejection,
        rejection::QueryRejection,
        Multipart, Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing;

/// Handler for POST /api/messages
pub async fn create_message(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AppError> {
    let mut multipart = multipart?;
    let mut submission = Submission::default();

    while let Some(field) = multipart.next_field().await? {
        let field_name = match field.name() {
            Some(name) => name.to_string(),
            None => continue,
        };
        match field_name.as_str() {
            "message" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Failed to read message: {}", e)))?;
                submission.message = Some(text);
            }
            "displayTime" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Failed to read displayTime: {}", e)))?;
                submission.display_time = Some(text);
            }
            "image" => {
                let file_name = field.file_name().map(|s| s.to_string());
                let content_type = field.content_type().map(|m| m.to_string());
                let data = field.bytes().await?.to_vec();
                submission.image = Some(ImageUpload { file_name, content_type, data });
            }
            _ => tracing::debug!("Ignoring unknown multipart field: {}", field_name),
        }
    }

    let record = state.lifecycle.create(submission).await?;
    let view_url = state.lifecycle.config().view_url(&record.id);

    Ok((StatusCode::OK, Json(CreatedMessage { id: record.id, view_url })))
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub id: Option<String>,
}

/// Handler for GET /api/messages?id=<id>
pub async fn get_message(
    State(state): State<Arc<AppState>>,
    query: Result<Query<MessageQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query?;
    let id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::MissingQueryParam("id".to_string()))?;

    match state.lifecycle.lookup(&id).await? {
        Lookup::Active(record) => Ok(Json(record)),
        Lookup::Expired => Err(AppError::MessageExpired(id)),
        Lookup::Missing => Err(AppError::MessageNotFound(id)),
    }
}

/// Handler for GET /api/images/{key}
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    tracing::debug!(image_key = %key, "Fetching image file via handler");

    let (byte_stream, content_type) = state.lifecycle.open_image(&key).await?;

    let content_type_header = content_type
        .as_deref()
        .unwrap_or("application/octet-stream");

    let data = byte_stream
        .collect()
        .await
        .map_err(|e| AppError::StorageError(StorageError::BackendError(anyhow::Error::new(e).context("Failed to collect image bytes from storage"))))?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_header)
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from(data.into_bytes()))
        .map_err(|e| AppError::InternalServerError(format!("Failed to build image response: {}", e)))?;

    Ok(response)
}

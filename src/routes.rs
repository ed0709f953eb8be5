use crate::{
    handlers,
    AppState, // Use the AppState defined in main.rs
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Creates the Axum router and associates routes with handlers.
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.lifecycle.config().max_upload_bytes;

    Router::new()
        .route(
            "/api/messages",
            post(handlers::create_message).get(handlers::get_message),
        )
        .route("/api/images/{key}", get(handlers::get_image))
        // Middleware Layers
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, StorageBackend};
    use crate::domain::{FileStorage, MessageRepository};
    use crate::errors::{RepoError, StorageError};
    use crate::lifecycle::MessageLifecycle;
    use crate::memory::{InMemoryFileStorage, InMemoryMessageRepository, ManualClock};
    use crate::models::MessageRecord;
    use async_trait::async_trait;
    use aws_sdk_s3::primitives::ByteStream;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    const BOUNDARY: &str = "----qrtestboundary";

    struct TestApp {
        router: Router,
        repo: Arc<InMemoryMessageRepository>,
        storage: Arc<InMemoryFileStorage>,
        clock: Arc<ManualClock>,
    }

    fn router_with(
        repo: Arc<dyn MessageRepository>,
        storage: Arc<dyn FileStorage>,
        clock: Arc<ManualClock>,
    ) -> Router {
        let config = Arc::new(Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            public_origin: "http://qr.test".into(),
            backend: StorageBackend::Memory,
            table_name: "messages".into(),
            aws_region: "ca-central-1".into(),
            localstack_endpoint: None,
            reaper_interval_secs: 0,
            max_upload_bytes: 64 * 1024,
        });
        let lifecycle = MessageLifecycle::new(repo, storage, clock, config);
        create_router(Arc::new(AppState { lifecycle }))
    }

    fn test_app() -> TestApp {
        let repo = Arc::new(InMemoryMessageRepository::new());
        let storage = Arc::new(InMemoryFileStorage::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let router = router_with(repo.clone(), storage.clone(), clock.clone());
        TestApp { router, repo, storage, clock }
    }

    /// Blob store whose uploads always fail.
    struct FailingUploadStorage;

    #[async_trait]
    impl FileStorage for FailingUploadStorage {
        async fn upload(&self, _key: &str, _data: Vec<u8>, _content_type: Option<String>) -> Result<(), StorageError> {
            Err(StorageError::UploadFailed("bucket gone".into()))
        }

        async fn download(&self, key: &str) -> Result<(ByteStream, Option<String>), StorageError> {
            Err(StorageError::NotFound(key.to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    /// Record store whose writes always fail.
    struct FailingPutRepository;

    #[async_trait]
    impl MessageRepository for FailingPutRepository {
        async fn put(&self, _record: &MessageRecord) -> Result<(), RepoError> {
            Err(RepoError::BackendError(anyhow::anyhow!("table throttled")))
        }

        async fn get(&self, _id: &str) -> Result<Option<MessageRecord>, RepoError> {
            Ok(None)
        }

        async fn delete(&self, _id: &str) -> Result<(), RepoError> {
            Ok(())
        }

        async fn list_expired(&self, _now_millis: i64) -> Result<Vec<MessageRecord>, RepoError> {
            Ok(Vec::new())
        }
    }

    enum Part<'a> {
        Text(&'a str, &'a str),
        File { name: &'a str, file_name: &'a str, content_type: &'a str, data: &'a [u8] },
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
                    );
                }
                Part::File { name, file_name, content_type, data } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                    body.extend_from_slice(b"\r\n");
                }
            }
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn post_message(router: &Router, parts: &[Part<'_>]) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/api/messages")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        send(router, req).await
    }

    async fn get_message(router: &Router, query: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .uri(format!("/api/messages{query}"))
            .body(Body::empty())
            .unwrap();
        send(router, req).await
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn hello_lifecycle_end_to_end() {
        let app = test_app();
        let (status, created) =
            post_message(&app.router, &[Part::Text("message", "hello"), Part::Text("displayTime", "2")]).await;
        assert_eq!(status, StatusCode::OK);
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["viewUrl"], format!("http://qr.test/view/{id}"));

        let (status, first) = get_message(&app.router, &format!("?id={id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["message"], "hello");
        assert_eq!(first["displayTime"], 2);

        let (status, second) = get_message(&app.router, &format!("?id={id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first, second);

        app.clock.advance_secs(3);
        let (status, _) = get_message(&app.router, &format!("?id={id}")).await;
        assert_eq!(status, StatusCode::GONE);
        let (status, body) = get_message(&app.router, &format!("?id={id}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn missing_display_time_defaults_to_ten_seconds() {
        let app = test_app();
        let (_, created) = post_message(&app.router, &[Part::Text("message", "hi")]).await;
        let id = created["id"].as_str().unwrap();

        let (_, record) = get_message(&app.router, &format!("?id={id}")).await;
        assert_eq!(record["displayTime"], 10);

        app.clock.advance_secs(9);
        assert_eq!(get_message(&app.router, &format!("?id={id}")).await.0, StatusCode::OK);
        app.clock.advance_secs(1);
        assert_eq!(get_message(&app.router, &format!("?id={id}")).await.0, StatusCode::GONE);
    }

    #[tokio::test]
    async fn empty_submission_is_rejected() {
        let app = test_app();
        let (status, body) = post_message(&app.router, &[Part::Text("message", ""), Part::Text("displayTime", "5")]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
        assert_eq!(app.repo.len().await, 0);
    }

    #[tokio::test]
    async fn gif_upload_is_rejected_without_writes() {
        let app = test_app();
        let (status, _) = post_message(
            &app.router,
            &[
                Part::Text("message", "look"),
                Part::File { name: "image", file_name: "anim.gif", content_type: "image/gif", data: b"GIF89a" },
            ],
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(app.repo.len().await, 0);
        assert_eq!(app.storage.len().await, 0);
    }

    #[tokio::test]
    async fn image_upload_is_served_and_purged() {
        let app = test_app();
        let (status, created) = post_message(
            &app.router,
            &[
                Part::File { name: "image", file_name: "cat.png", content_type: "image/png", data: b"\x89PNG" },
                Part::Text("displayTime", "4"),
            ],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = created["id"].as_str().unwrap();

        let (_, record) = get_message(&app.router, &format!("?id={id}")).await;
        let key = format!("{id}-cat.png");
        assert_eq!(record["imagePath"], key.as_str());
        assert!(record["message"].is_null());

        let req = Request::builder().uri(format!("/api/images/{key}")).body(Body::empty()).unwrap();
        let resp = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(bytes.as_ref(), b"\x89PNG");

        app.clock.advance_secs(4);
        assert_eq!(get_message(&app.router, &format!("?id={id}")).await.0, StatusCode::GONE);
        assert!(!app.storage.contains(&key).await);
    }

    #[tokio::test]
    async fn missing_or_unknown_id() {
        let app = test_app();
        assert_eq!(get_message(&app.router, "").await.0, StatusCode::BAD_REQUEST);
        assert_eq!(get_message(&app.router, "?id=").await.0, StatusCode::BAD_REQUEST);
        assert_eq!(get_message(&app.router, "?id=nope").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn extractor_rejections_are_json() {
        let app = test_app();
        let req = Request::builder()
            .method("POST")
            .uri("/api/messages")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"message":"hi"}"#))
            .unwrap();
        let (status, body) = send(&app.router, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid input:"));
        assert_eq!(app.repo.len().await, 0);

        let (status, body) = get_message(&app.router, "?id=a&id=b").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid input:"));
    }

    #[tokio::test]
    async fn upload_failure_is_500_with_backend_message() {
        let repo = Arc::new(InMemoryMessageRepository::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let router = router_with(repo.clone(), Arc::new(FailingUploadStorage), clock);

        let (status, body) = post_message(
            &router,
            &[
                Part::Text("message", "hi"),
                Part::File { name: "image", file_name: "cat.png", content_type: "image/png", data: b"\x89PNG" },
            ],
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["error"],
            "File storage operation failed: File upload failed: bucket gone"
        );
        assert_eq!(repo.len().await, 0);
    }

    #[tokio::test]
    async fn record_write_failure_is_500_with_backend_message() {
        let storage = Arc::new(InMemoryFileStorage::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let router = router_with(Arc::new(FailingPutRepository), storage.clone(), clock);

        let (status, body) = post_message(&router, &[Part::Text("message", "hi")]).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let error = body["error"].as_str().unwrap();
        assert!(error.starts_with("Message store operation failed:"));
        assert!(error.contains("table throttled"));

        // The blob written before the failed record write is left in place.
        let (status, _) = post_message(
            &router,
            &[Part::File { name: "image", file_name: "cat.png", content_type: "image/png", data: b"\x89PNG" }],
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(storage.len().await, 1);
    }
}

use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod aws_clients;
mod config;
mod domain;
mod errors;
mod handlers;
mod lifecycle;
mod memory;
mod models;
mod reaper;
mod repositories;
mod routes;
mod startup;
mod storage;

use crate::config::{Config, StorageBackend};
use crate::domain::{FileStorage, MessageRepository, SystemClock};
use crate::errors::AppError;
use crate::lifecycle::MessageLifecycle;

/// AppState holds shared resources for the web server.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: MessageLifecycle,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing (logging)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ephemeral_messages=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::load()?);
    tracing::info!(backend = ?config.backend, origin = %config.public_origin, "Configuration loaded");

    let (repo, file_storage) = build_backends(&config).await?;
    let lifecycle = MessageLifecycle::new(repo, file_storage, Arc::new(SystemClock), config.clone());

    // --- Background reaper ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper_task = if config.reaper_interval_secs > 0 {
        let reaper = reaper::Reaper::new(lifecycle.clone(), Duration::from_secs(config.reaper_interval_secs));
        tracing::info!(interval_secs = config.reaper_interval_secs, "Starting message reaper");
        Some(tokio::spawn(reaper.run(shutdown_rx)))
    } else {
        tracing::warn!("Message reaper disabled; expired messages are only removed when read");
        None
    };

    let app = routes::create_router(Arc::new(AppState { lifecycle }));

    tracing::info!("Server listening on http://{}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(task) = reaper_task {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Message reaper task failed");
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Connects the record and blob stores selected by configuration.
async fn build_backends(
    config: &Config,
) -> Result<(Arc<dyn MessageRepository>, Arc<dyn FileStorage>), AppError> {
    match &config.backend {
        StorageBackend::Aws { bucket_name } => {
            tracing::info!("Initializing AWS clients...");
            let sdk_config = aws_clients::create_sdk_config(config).await;
            let db_client = aws_clients::create_dynamodb_client(&sdk_config);
            let s3_client = aws_clients::create_s3_client(&sdk_config);

            startup::init_resources(
                &db_client,
                &s3_client,
                &config.table_name,
                bucket_name,
                &config.aws_region,
            )
            .await?;

            let repo: Arc<dyn MessageRepository> =
                Arc::new(repositories::DynamoDbMessageRepository::new(db_client, config.table_name.clone()));
            let file_storage: Arc<dyn FileStorage> =
                Arc::new(storage::S3FileStorage::new(s3_client, bucket_name.clone()));
            Ok((repo, file_storage))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; messages are lost on restart");
            let repo: Arc<dyn MessageRepository> = Arc::new(memory::InMemoryMessageRepository::new());
            let file_storage: Arc<dyn FileStorage> = Arc::new(memory::InMemoryFileStorage::new());
            Ok((repo, file_storage))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

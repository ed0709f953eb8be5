use std::{env, net::SocketAddr, str::FromStr};
use thiserror::Error;

/// Seconds a message stays readable when the submission carries no usable `displayTime`.
pub const DEFAULT_DISPLAY_TIME_SECS: i64 = 10;

/// Content types accepted for the optional image attachment.
pub const ALLOWED_IMAGE_CONTENT_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
const DEFAULT_PUBLIC_ORIGIN: &str = "http://localhost:3000";
const DEFAULT_TABLE_NAME: &str = "messages";
const DEFAULT_REGION: &str = "ca-central-1";
const DEFAULT_REAPER_INTERVAL_SECS: u64 = 60;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
    #[error(transparent)]
    DotEnvError(#[from] dotenvy::Error),
}

/// Where records and images are persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    /// DynamoDB for records, S3 for images.
    Aws { bucket_name: String },
    /// Process-local maps. Lost on restart; development and tests only.
    Memory,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Origin used to build `viewUrl` and `imageUrl`, without a trailing slash.
    pub public_origin: String,
    pub backend: StorageBackend,
    pub table_name: String,
    // Store region as string for simplicity here, aws_clients can convert
    pub aws_region: String,
    // Optional endpoint for LocalStack
    pub localstack_endpoint: Option<String>,
    /// Zero disables the background reaper.
    pub reaper_interval_secs: u64,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignores a missing file, relies on env vars otherwise)
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_address_str =
            lookup("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
        let bind_address = SocketAddr::from_str(&bind_address_str)
            .map_err(|e| ConfigError::InvalidVar("BIND_ADDRESS".into(), e.to_string()))?;

        let public_origin = lookup("PUBLIC_ORIGIN")
            .unwrap_or_else(|| DEFAULT_PUBLIC_ORIGIN.to_string())
            .trim_end_matches('/')
            .to_string();

        let backend = match lookup("STORAGE_BACKEND").as_deref().unwrap_or("aws") {
            "aws" => {
                let bucket_name = lookup("MESSAGE_BUCKET_NAME")
                    .ok_or_else(|| ConfigError::MissingVar("MESSAGE_BUCKET_NAME".into()))?;
                StorageBackend::Aws { bucket_name }
            }
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::InvalidVar(
                    "STORAGE_BACKEND".into(),
                    format!("expected 'aws' or 'memory', got '{}'", other),
                ));
            }
        };

        let table_name =
            lookup("MESSAGE_TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string());

        let aws_region =
            lookup("AWS_DEFAULT_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());

        // Allow overriding endpoint for localstack/testing
        let localstack_endpoint = lookup("AWS_ENDPOINT_URL");

        let reaper_interval_secs =
            parse_or("REAPER_INTERVAL_SECS", &lookup, DEFAULT_REAPER_INTERVAL_SECS)?;
        let max_upload_bytes = parse_or("MAX_UPLOAD_BYTES", &lookup, DEFAULT_MAX_UPLOAD_BYTES)?;

        Ok(Config {
            bind_address,
            public_origin,
            backend,
            table_name,
            aws_region,
            localstack_endpoint,
            reaper_interval_secs,
            max_upload_bytes,
        })
    }

    /// URL a viewer opens (and the QR code encodes) for a message.
    pub fn view_url(&self, id: &str) -> String {
        format!("{}/view/{}", self.public_origin, id)
    }

    /// Public URL of a stored image, served by the image route.
    pub fn image_url(&self, image_key: &str) -> String {
        format!("{}/api/images/{}", self.public_origin, image_key)
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidVar(key.into(), e.to_string())),
        None => Ok(default),
    }
}

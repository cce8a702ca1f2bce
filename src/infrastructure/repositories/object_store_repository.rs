use crate::domain::shared::Retryable;
use async_trait::async_trait;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    /// Network failures, timeouts, throttling, 5xx
    #[error("transient storage error: {0}")]
    Transient(String),
    /// Auth, permissions, malformed keys
    #[error("storage error: {0}")]
    Permanent(String),
}

impl Retryable for ObjectStoreError {
    fn is_retryable(&self) -> bool {
        matches!(self, ObjectStoreError::Transient(_))
    }
}

/// Durable blob storage for audio artifacts and session text.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), ObjectStoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    /// Keys under `prefix`, in no particular order
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError>;

    fn public_url(&self, key: &str) -> String;
}

/// Keys are relative, slash-separated and free of traversal segments
pub fn validate_key(key: &str) -> Result<(), ObjectStoreError> {
    let malformed = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if malformed {
        return Err(ObjectStoreError::Permanent(format!("malformed object key '{}'", key)));
    }
    Ok(())
}

/// Join a public base URL and a key, percent-encoding each path segment
pub fn join_url(base_url: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("{}/{}", base_url.trim_end_matches('/'), encoded.join("/"))
}

use super::voice::AudioEncoding;
use crate::domain::shared::{RetryError, RetryPolicy};
use crate::infrastructure::repositories::{ObjectStore, ObjectStoreError};
use std::sync::Arc;
use std::time::Duration;

pub fn chunk_key(session_id: &str, index: usize, encoding: AudioEncoding) -> String {
    format!("{}/chunk-{}.{}", session_id, index, encoding.extension())
}

pub fn merged_key(session_id: &str, encoding: AudioEncoding) -> String {
    format!("{}/merged.{}", session_id, encoding.extension())
}

pub fn final_key(session_id: &str, encoding: AudioEncoding) -> String {
    format!("{}/final.{}", session_id, encoding.extension())
}

#[derive(Debug, thiserror::Error)]
#[error("upload of {key} {source}")]
pub struct PublishError {
    pub key: String,
    #[source]
    pub source: RetryError<ObjectStoreError>,
}

/// Uploads artifacts with per-attempt timeouts and exponential backoff
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStore>, retry: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self {
            store,
            retry,
            attempt_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Upload `bytes` under `key` and return its public URL
    pub async fn publish(&self, bytes: Vec<u8>, key: &str, content_type: &str) -> Result<String, PublishError> {
        let size = bytes.len();

        self.retry
            .run("publish", |attempt| {
                let bytes = bytes.clone();
                async move {
                    tracing::debug!(key, attempt, size, "Uploading artifact");
                    match tokio::time::timeout(self.attempt_timeout, self.store.put(key, bytes, content_type)).await {
                        Ok(result) => result,
                        Err(_) => Err(ObjectStoreError::Transient(format!(
                            "upload attempt timed out after {:?}",
                            self.attempt_timeout
                        ))),
                    }
                }
            })
            .await
            .map_err(|source| PublishError {
                key: key.to_string(),
                source,
            })?;

        let url = self.store.public_url(key);
        tracing::info!(key, size, url = %url, "Artifact published");
        Ok(url)
    }
}

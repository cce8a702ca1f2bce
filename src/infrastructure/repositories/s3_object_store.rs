use super::object_store_repository::{join_url, validate_key, ObjectStore, ObjectStoreError};
use super::tts_repository::is_transient_status;
use async_trait::async_trait;
use aws_sdk_s3::{
    config::http::HttpResponse,
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream,
    Client as S3Client,
};
use std::sync::Arc;

/// S3-compatible object store (AWS S3, MinIO, R2 with a custom endpoint)
pub struct S3ObjectStore {
    s3_client: Arc<S3Client>,
    bucket: String,
    public_base_url: String,
}

impl S3ObjectStore {
    pub fn new(s3_client: Arc<S3Client>, bucket: String, public_base_url: String) -> Self {
        Self {
            s3_client,
            bucket,
            public_base_url,
        }
    }

    /// Virtual-hosted style URL used when no public base URL is configured
    pub fn default_base_url(bucket: &str, region: &str, endpoint: Option<&str>) -> String {
        match endpoint {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), bucket),
            None => format!("https://{}.s3.{}.amazonaws.com", bucket, region),
        }
    }
}

fn classify<E>(operation: &str, err: SdkError<E, HttpResponse>) -> ObjectStoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let message = format!("S3 {} failed: {}", operation, DisplayErrorContext(&err));
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ObjectStoreError::Transient(message)
        }
        SdkError::ServiceError(service) if is_transient_status(service.raw().status().as_u16()) => {
            ObjectStoreError::Transient(message)
        }
        _ => ObjectStoreError::Permanent(message),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), ObjectStoreError> {
        validate_key(key)?;
        let size = bytes.len();

        self.s3_client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| classify("put_object", e))?;

        tracing::debug!(bucket = %self.bucket, key, size, "Object uploaded");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        validate_key(key)?;

        let output = self
            .s3_client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) {
                    ObjectStoreError::NotFound(key.to_string())
                } else {
                    classify("get_object", e)
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Transient(format!("failed to read object body: {}", e)))?;

        Ok(body.into_bytes().to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let output = self
                .s3_client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| classify("list_objects_v2", e))?;

            keys.extend(output.contents().iter().filter_map(|o| o.key().map(str::to_string)));

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(keys)
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_base_url, key)
    }
}

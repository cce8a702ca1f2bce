use super::program::ProgramAssembler;
use crate::domain::tts::publisher::{final_key, Publisher};
use crate::domain::tts::{JobStore, TtsServiceError};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ProgramResult {
    pub session_id: String,
    pub key: String,
    pub url: String,
    pub bytes: usize,
}

#[async_trait]
pub trait ProgramServiceApi: Send + Sync {
    /// Wrap a session's merged audio with intro and outro tracks and publish it.
    /// Missing keys fall back to the configured defaults.
    async fn create_program(
        &self,
        session_id: &str,
        intro_key: Option<String>,
        outro_key: Option<String>,
    ) -> Result<ProgramResult, TtsServiceError>;
}

pub struct ProgramService {
    assembler: ProgramAssembler,
    publisher: Arc<Publisher>,
    jobs: Arc<JobStore>,
    default_intro_key: Option<String>,
    default_outro_key: Option<String>,
}

impl ProgramService {
    pub fn new(
        assembler: ProgramAssembler,
        publisher: Arc<Publisher>,
        jobs: Arc<JobStore>,
        default_intro_key: Option<String>,
        default_outro_key: Option<String>,
    ) -> Self {
        Self {
            assembler,
            publisher,
            jobs,
            default_intro_key,
            default_outro_key,
        }
    }
}

#[async_trait]
impl ProgramServiceApi for ProgramService {
    async fn create_program(
        &self,
        session_id: &str,
        intro_key: Option<String>,
        outro_key: Option<String>,
    ) -> Result<ProgramResult, TtsServiceError> {
        let intro_key = intro_key
            .or_else(|| self.default_intro_key.clone())
            .ok_or_else(|| TtsServiceError::Invalid("introKey is required".to_string()))?;
        let outro_key = outro_key
            .or_else(|| self.default_outro_key.clone())
            .ok_or_else(|| TtsServiceError::Invalid("outroKey is required".to_string()))?;

        let job = self
            .jobs
            .get(session_id)
            .await
            .ok_or_else(|| TtsServiceError::NotFound(format!("no job for session {}", session_id)))?;
        let (Some(content_key), Some(encoding)) = (job.result_ref, job.encoding) else {
            return Err(TtsServiceError::NotFound(format!(
                "merged audio for session {} is not ready",
                session_id
            )));
        };

        let store = self.publisher.store();
        let intro = store.get(&intro_key).await?;
        let content = store.get(&content_key).await?;
        let outro = store.get(&outro_key).await?;

        tracing::info!(
            session_id,
            intro_key = %intro_key,
            outro_key = %outro_key,
            content_size = content.len(),
            "Building program"
        );

        let program = self
            .assembler
            .assemble_program(intro, content, outro, encoding)
            .await?;

        let key = final_key(session_id, encoding);
        let bytes = program.byte_count;
        let url = self.publisher.publish(program.bytes, &key, encoding.mime_type()).await?;

        Ok(ProgramResult {
            session_id: session_id.to_string(),
            key,
            url,
            bytes,
        })
    }
}

use crate::domain::shared::Retryable;
use crate::domain::tts::{AudioEncoding, VoiceConfig};
use async_trait::async_trait;

/// One provider call: a single segment's wire payload plus the voice to render it with
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub payload: String,
    /// `payload` is SSML rather than plain text
    pub is_markup: bool,
    pub voice: VoiceConfig,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Network failures, throttling, 5xx responses
    #[error("transient provider error: {0}")]
    Transient(String),
    /// The provider refused the request (auth, bad voice, payload too large)
    #[error("provider rejected request: {0}")]
    Rejected(String),
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Repository for TTS synthesis operations.
/// Abstracts the underlying TTS provider (AWS Polly, Google Cloud, OpenAI).
///
/// Implementations make exactly one provider call per invocation. Splitting
/// long text, concurrency, retries and merging all live above this trait.
#[async_trait]
pub trait TtsRepository: Send + Sync {
    /// Short provider name used in logs and validation errors
    fn name(&self) -> &'static str;

    /// Encodings this provider can return
    fn supported_encodings(&self) -> &'static [AudioEncoding];

    /// Synthesize one payload to audio bytes in `request.voice.encoding`
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, ProviderError>;
}

/// Classify an HTTP status returned by a provider or storage service
pub fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

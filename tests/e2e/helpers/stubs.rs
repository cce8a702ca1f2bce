use async_trait::async_trait;
use longform_tts::domain::tts::AudioEncoding;
use longform_tts::infrastructure::repositories::{ProviderError, SynthesisRequest, TtsRepository};
use std::time::Duration;

/// Deterministic provider for end-to-end tests.
///
/// Every call returns ten bytes, each the first byte of the payload.
/// Payloads containing `FAIL` are rejected; payloads containing `SLOW`
/// take half a second.
pub struct StubTtsProvider;

#[async_trait]
impl TtsRepository for StubTtsProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supported_encodings(&self) -> &'static [AudioEncoding] {
        &[AudioEncoding::Mp3, AudioEncoding::Pcm]
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, ProviderError> {
        if request.payload.contains("SLOW") {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        if request.payload.contains("FAIL") {
            return Err(ProviderError::Rejected("voice unavailable".to_string()));
        }
        Ok(vec![request.payload.as_bytes()[0]; 10])
    }
}

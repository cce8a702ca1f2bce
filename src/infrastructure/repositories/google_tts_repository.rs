use super::tts_repository::{is_transient_status, ProviderError, SynthesisRequest, TtsRepository};
use crate::domain::tts::{AudioEncoding, VoiceConfig};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

pub const GOOGLE_TTS_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

const SUPPORTED: &[AudioEncoding] = &[
    AudioEncoding::Mp3,
    AudioEncoding::OggOpus,
    AudioEncoding::Linear16,
    AudioEncoding::Mulaw,
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

/// Google Cloud Text-to-Speech over its REST API, authenticated with an API key
pub struct GoogleTtsRepository {
    http_client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl GoogleTtsRepository {
    pub fn new(api_key: String) -> Self {
        Self::with_endpoint(api_key, GOOGLE_TTS_URL.to_string())
    }

    pub fn with_endpoint(api_key: String, endpoint: String) -> Self {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http_client,
            api_key,
            endpoint,
        }
    }

    fn request_body(request: &SynthesisRequest) -> Value {
        let voice = &request.voice;
        let input = if request.is_markup {
            json!({ "ssml": request.payload })
        } else {
            json!({ "text": request.payload })
        };

        let mut voice_params = json!({ "languageCode": voice.language_code });
        if let Some(name) = &voice.voice_name {
            voice_params["name"] = json!(name);
        }

        json!({
            "input": input,
            "voice": voice_params,
            "audioConfig": Self::audio_config(voice),
        })
    }

    fn audio_config(voice: &VoiceConfig) -> Value {
        let mut config = json!({
            "audioEncoding": voice.encoding.as_str(),
            "speakingRate": voice.speaking_rate,
            "pitch": voice.pitch,
            "volumeGainDb": voice.volume_gain_db,
        });
        if let Some(rate) = voice.sample_rate_hertz {
            config["sampleRateHertz"] = json!(rate);
        }
        config
    }
}

#[async_trait]
impl TtsRepository for GoogleTtsRepository {
    fn name(&self) -> &'static str {
        "google"
    }

    fn supported_encodings(&self) -> &'static [AudioEncoding] {
        SUPPORTED
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, ProviderError> {
        tracing::debug!(
            language = %request.voice.language_code,
            voice = request.voice.voice_name.as_deref().unwrap_or("default"),
            encoding = %request.voice.encoding,
            markup = request.is_markup,
            payload_length = request.payload.len(),
            "Calling Google text:synthesize"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("X-Goog-Api-Key", &self.api_key)
            .json(&Self::request_body(request))
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("Google TTS request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("Google TTS returned {}: {}", status.as_u16(), body);
            tracing::error!(status = status.as_u16(), "Google text:synthesize failed");
            return Err(if is_transient_status(status.as_u16()) {
                ProviderError::Transient(message)
            } else {
                ProviderError::Rejected(message)
            });
        }

        let body: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("invalid Google TTS response: {}", e)))?;

        base64::engine::general_purpose::STANDARD
            .decode(&body.audio_content)
            .map_err(|e| ProviderError::Rejected(format!("failed to decode base64 audio: {}", e)))
    }
}

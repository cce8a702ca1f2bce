use super::tts_repository::{ProviderError, SynthesisRequest, TtsRepository};
use crate::domain::tts::{AudioEncoding, LanguageCode};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{CreateSpeechRequest, SpeechModel, SpeechResponseFormat, Voice},
    Client,
};
use async_trait::async_trait;
use std::sync::Arc;

const SUPPORTED: &[AudioEncoding] = &[AudioEncoding::Mp3];

pub struct OpenAiTtsRepository {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
    default_voice: String,
}

impl OpenAiTtsRepository {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String, default_voice: String) -> Self {
        Self {
            client,
            model,
            default_voice,
        }
    }

    fn get_voice_for_language(language: LanguageCode) -> &'static str {
        match language {
            LanguageCode::English => "alloy",
            LanguageCode::Spanish => "echo",
            LanguageCode::French => "nova",
            LanguageCode::German => "onyx",
            LanguageCode::Italian => "fable",
            LanguageCode::Portuguese => "shimmer",
        }
    }

    fn speech_model(&self) -> SpeechModel {
        match self.model.as_str() {
            "tts-1" => SpeechModel::Tts1,
            "tts-1-hd" => SpeechModel::Tts1Hd,
            other => SpeechModel::Other(other.to_string()),
        }
    }

    fn voice(name: &str) -> Voice {
        match name.to_lowercase().as_str() {
            "echo" => Voice::Echo,
            "fable" => Voice::Fable,
            "onyx" => Voice::Onyx,
            "nova" => Voice::Nova,
            "shimmer" => Voice::Shimmer,
            _ => Voice::Alloy,
        }
    }
}

fn classify(err: OpenAIError) -> ProviderError {
    match &err {
        OpenAIError::Reqwest(_) | OpenAIError::StreamError(_) => {
            ProviderError::Transient(format!("OpenAI TTS error: {}", err))
        }
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.as_deref().or(api.code.as_deref()).unwrap_or_default();
            if kind.contains("rate_limit") || kind.contains("server_error") {
                ProviderError::Transient(format!("OpenAI TTS error: {}", err))
            } else {
                ProviderError::Rejected(format!("OpenAI TTS error: {}", err))
            }
        }
        _ => ProviderError::Rejected(format!("OpenAI TTS error: {}", err)),
    }
}

#[async_trait]
impl TtsRepository for OpenAiTtsRepository {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn supported_encodings(&self) -> &'static [AudioEncoding] {
        SUPPORTED
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, ProviderError> {
        let voice = &request.voice;
        let voice_name = match (&voice.voice_name, self.default_voice.is_empty()) {
            (Some(name), _) => name.clone(),
            (None, false) => self.default_voice.clone(),
            (None, true) => {
                Self::get_voice_for_language(voice.language().unwrap_or(LanguageCode::English)).to_string()
            }
        };

        tracing::debug!(
            model = %self.model,
            voice = %voice_name,
            payload_length = request.payload.len(),
            "Calling OpenAI TTS API"
        );

        let speech = CreateSpeechRequest {
            model: self.speech_model(),
            input: request.payload.clone(),
            voice: Self::voice(&voice_name),
            response_format: Some(SpeechResponseFormat::Mp3),
            speed: Some(voice.speaking_rate),
        };

        let response = self.client.audio().speech(speech).await.map_err(|e| {
            let err = classify(e);
            tracing::error!(error = %err, model = %self.model, voice = %voice_name, "OpenAI TTS API call failed");
            err
        })?;

        Ok(response.bytes.to_vec())
    }
}

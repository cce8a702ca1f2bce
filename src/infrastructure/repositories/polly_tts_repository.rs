use super::tts_repository::{is_transient_status, ProviderError, SynthesisRequest, TtsRepository};
use crate::domain::tts::{AudioEncoding, LanguageCode};
use async_trait::async_trait;
use aws_sdk_polly::{
    config::http::HttpResponse,
    error::{DisplayErrorContext, SdkError},
    types::{Engine, OutputFormat, TextType, VoiceId},
    Client as PollyClient,
};
use std::sync::Arc;

const SUPPORTED: &[AudioEncoding] = &[AudioEncoding::Mp3, AudioEncoding::Pcm];

/// AWS Polly implementation of TTS repository
pub struct PollyTtsRepository {
    polly_client: Arc<PollyClient>,
}

impl PollyTtsRepository {
    pub fn new(polly_client: Arc<PollyClient>) -> Self {
        Self { polly_client }
    }

    /// Select the appropriate Polly voice for a language
    fn get_voice_for_language(language: LanguageCode) -> &'static str {
        match language {
            LanguageCode::English => "Joanna",
            LanguageCode::Spanish => "Lupe",
            LanguageCode::French => "Lea",
            LanguageCode::German => "Vicki",
            LanguageCode::Italian => "Bianca",
            LanguageCode::Portuguese => "Ines",
        }
    }

    fn output_format(encoding: AudioEncoding) -> Result<OutputFormat, ProviderError> {
        match encoding {
            AudioEncoding::Mp3 => Ok(OutputFormat::Mp3),
            AudioEncoding::Pcm => Ok(OutputFormat::Pcm),
            other => Err(ProviderError::Rejected(format!("polly cannot produce {}", other))),
        }
    }
}

/// Throttling, dispatch failures and 5xx are worth another attempt
fn classify<E>(err: SdkError<E, HttpResponse>) -> ProviderError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let message = format!("AWS Polly error: {}", DisplayErrorContext(&err));
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ProviderError::Transient(message)
        }
        SdkError::ServiceError(service) if is_transient_status(service.raw().status().as_u16()) => {
            ProviderError::Transient(message)
        }
        _ => ProviderError::Rejected(message),
    }
}

#[async_trait]
impl TtsRepository for PollyTtsRepository {
    fn name(&self) -> &'static str {
        "polly"
    }

    fn supported_encodings(&self) -> &'static [AudioEncoding] {
        SUPPORTED
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, ProviderError> {
        let voice = &request.voice;
        let voice_name = voice.voice_name.clone().unwrap_or_else(|| {
            Self::get_voice_for_language(voice.language().unwrap_or(LanguageCode::English)).to_string()
        });
        let output_format = Self::output_format(voice.encoding)?;
        let text_type = if request.is_markup { TextType::Ssml } else { TextType::Text };

        tracing::debug!(
            language = %voice.language_code,
            voice = %voice_name,
            output_format = %voice.encoding,
            markup = request.is_markup,
            payload_length = request.payload.len(),
            "Calling AWS Polly synthesize_speech"
        );

        let mut call = self
            .polly_client
            .synthesize_speech()
            .text(&request.payload)
            .text_type(text_type)
            .voice_id(VoiceId::from(voice_name.as_str()))
            .output_format(output_format)
            .engine(Engine::Neural);
        if let Some(rate) = voice.sample_rate_hertz {
            call = call.sample_rate(rate.to_string());
        }

        let result = call.send().await.map_err(|e| {
            let err = classify(e);
            tracing::error!(error = %err, voice = %voice_name, "AWS Polly synthesize_speech failed");
            err
        })?;

        let audio_stream = result.audio_stream.collect().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to collect audio stream from Polly response");
            ProviderError::Transient(format!("failed to read audio stream: {}", e))
        })?;

        Ok(audio_stream.into_bytes().to_vec())
    }
}

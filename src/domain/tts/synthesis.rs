use super::markup::MarkupEnricher;
use super::segmenter::Segment;
use super::voice::VoiceConfig;
use crate::domain::shared::Retryable;
use crate::infrastructure::repositories::{ProviderError, SynthesisRequest, TtsRepository};
use moka::future::Cache;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a segment produced no audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Provider,
    EmptyInput,
    EmptyResponse,
    Cancelled,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthesisError {
    #[error("synthesis timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("segment text is empty")]
    EmptyInput,
    #[error("provider returned an empty audio payload")]
    EmptyResponse,
}

impl SynthesisError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SynthesisError::Timeout(_) => FailureKind::Timeout,
            SynthesisError::Provider(_) => FailureKind::Provider,
            SynthesisError::EmptyInput => FailureKind::EmptyInput,
            SynthesisError::EmptyResponse => FailureKind::EmptyResponse,
        }
    }
}

impl Retryable for SynthesisError {
    fn is_retryable(&self) -> bool {
        match self {
            SynthesisError::Timeout(_) => true,
            SynthesisError::Provider(err) => err.is_retryable(),
            SynthesisError::EmptyInput | SynthesisError::EmptyResponse => false,
        }
    }
}

/// Immutable work item handed to the worker pool
#[derive(Debug, Clone)]
pub struct SynthesisTask {
    pub segment: Segment,
    pub voice: Arc<VoiceConfig>,
}

/// Terminal result of one task, produced exactly once per submitted task
#[derive(Debug, Clone)]
pub enum SynthesisOutcome {
    Success {
        index: usize,
        audio: Vec<u8>,
        byte_count: usize,
    },
    Failure {
        index: usize,
        kind: FailureKind,
        message: String,
    },
}

impl SynthesisOutcome {
    pub fn index(&self) -> usize {
        match self {
            SynthesisOutcome::Success { index, .. } | SynthesisOutcome::Failure { index, .. } => *index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SynthesisOutcome::Success { .. })
    }
}

/// Wraps one provider call with a hard timeout and structured failures.
/// Does not retry; retries are a pool policy.
pub struct SynthesisClient {
    provider: Arc<dyn TtsRepository>,
    enricher: Arc<dyn MarkupEnricher>,
    call_timeout: Duration,
    cache: Option<Cache<String, Vec<u8>>>,
}

impl SynthesisClient {
    pub fn new(
        provider: Arc<dyn TtsRepository>,
        enricher: Arc<dyn MarkupEnricher>,
        call_timeout: Duration,
        cache_enabled: bool,
    ) -> Self {
        let cache = if cache_enabled {
            Some(
                Cache::builder()
                    .max_capacity(1000)
                    .time_to_idle(Duration::from_secs(30 * 60)) // 30 minutes, refreshes on access
                    .build(),
            )
        } else {
            None
        };

        Self {
            provider,
            enricher,
            call_timeout,
            cache,
        }
    }

    pub fn provider(&self) -> &Arc<dyn TtsRepository> {
        &self.provider
    }

    pub fn enricher(&self) -> &Arc<dyn MarkupEnricher> {
        &self.enricher
    }

    pub async fn synthesize(&self, segment: &Segment, voice: &VoiceConfig) -> Result<Vec<u8>, SynthesisError> {
        if segment.text.trim().is_empty() {
            return Err(SynthesisError::EmptyInput);
        }

        let request = SynthesisRequest {
            payload: self.enricher.enrich(&segment.text, voice),
            is_markup: self.enricher.is_markup(),
            voice: voice.clone(),
        };

        let cache_key = self.cache.as_ref().map(|_| {
            format!("{}|{}|{}", self.provider.name(), voice.cache_key(), request.payload)
        });
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(audio) = cache.get(key).await {
                tracing::debug!(
                    segment_index = segment.index,
                    audio_size = audio.len(),
                    "Segment cache hit"
                );
                return Ok(audio);
            }
        }

        let started = Instant::now();
        let audio = tokio::time::timeout(self.call_timeout, self.provider.synthesize(&request))
            .await
            .map_err(|_| SynthesisError::Timeout(self.call_timeout))??;

        if audio.is_empty() {
            return Err(SynthesisError::EmptyResponse);
        }

        tracing::debug!(
            provider = self.provider.name(),
            segment_index = segment.index,
            payload_bytes = request.payload.len(),
            audio_size = audio.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Segment synthesized"
        );

        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            cache.insert(key, audio.clone()).await;
        }

        Ok(audio)
    }
}

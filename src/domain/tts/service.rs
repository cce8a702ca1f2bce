use super::collector::{collect, Collected};
use super::dto::{
    describe_failures, ChunkResponse, ServiceStatusResponse, SubmitResponse, SynthesisResponse, SynthesizeRequest,
};
use super::error::TtsServiceError;
use super::job::{Job, JobStore};
use super::language::detect_language;
use super::pool::{FailurePolicy, Interruption, PoolOptions, WorkerPool};
use super::publisher::{chunk_key, merged_key, Publisher};
use super::segmenter::{segment, Segment};
use super::synthesis::{FailureKind, SynthesisOutcome, SynthesisTask};
use super::voice::{AudioEncoding, VoiceConfig};
use crate::domain::audio::{AudioAssembler, MergedAudio};
use crate::domain::shared::RetryPolicy;
use crate::infrastructure::repositories::TextSource;
use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use html2text::from_read;
use lingua::{LanguageDetector, LanguageDetectorBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s]+").expect("url pattern is valid"));
static WHITESPACE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

const MAX_SESSION_ID_LEN: usize = 128;

/// Knobs for one deployment of the pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub default_concurrency: usize,
    pub max_concurrency: usize,
    pub max_segment_bytes: usize,
    pub failure_policy: FailurePolicy,
    pub synthesis_retry: RetryPolicy,
    /// Whole-operation deadline: synthesis fan-out, assembly and uploads
    pub request_timeout: Option<Duration>,
    pub upload_chunks: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_concurrency: super::pool::DEFAULT_CONCURRENCY,
            max_concurrency: 16,
            max_segment_bytes: 3000,
            failure_policy: FailurePolicy::BestEffort,
            synthesis_retry: RetryPolicy::none(),
            request_timeout: Some(Duration::from_secs(300)),
            upload_chunks: true,
        }
    }
}

/// A validated request, ready to fan out
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub session_id: String,
    pub segments: Vec<Segment>,
    pub voice: Arc<VoiceConfig>,
    pub concurrency: usize,
    pub return_base64: bool,
}

#[derive(Debug)]
pub struct PipelineOutput {
    pub collected: Collected,
    pub merged: MergedAudio,
    pub merged_key: String,
    pub merged_url: String,
    /// Deadline the run was started with; chunk uploads stop there too
    pub deadline: Option<Instant>,
}

/// Moves a session's job to `error` when its run is dropped before finishing.
///
/// A synchronous request's run lives in the handler future, so a client
/// disconnect drops it mid-flight. Without this the job would stay `running`
/// and block the session until it expires from the store.
struct RunGuard {
    jobs: Arc<JobStore>,
    job: Job,
    tracker: Option<JoinHandle<Job>>,
    armed: bool,
}

impl RunGuard {
    /// Latest snapshot written by the progress tracker
    async fn settle(&mut self) -> Job {
        match self.tracker.take() {
            Some(tracker) => tracker.await.unwrap_or_else(|_| self.job.clone()),
            None => self.job.clone(),
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        tracing::warn!(session_id = %self.job.session_id, "Synthesis run dropped before completion");
        let jobs = self.jobs.clone();
        let job = self.job.clone();
        let tracker = self.tracker.take();
        runtime.spawn(async move {
            // the tracker must not overwrite the terminal snapshot
            let job = match tracker {
                Some(tracker) => {
                    tracker.abort();
                    tracker.await.unwrap_or(job)
                }
                None => job,
            };
            jobs.update(job.failed("request cancelled".to_string(), Vec::new())).await;
        });
    }
}

pub struct TtsService {
    text_source: Arc<dyn TextSource>,
    pool: WorkerPool,
    assembler: Arc<dyn AudioAssembler>,
    publisher: Arc<Publisher>,
    jobs: Arc<JobStore>,
    language_detector: LanguageDetector,
    settings: PipelineSettings,
    shutdown: CancellationToken,
}

impl TtsService {
    pub fn new(
        text_source: Arc<dyn TextSource>,
        pool: WorkerPool,
        assembler: Arc<dyn AudioAssembler>,
        publisher: Arc<Publisher>,
        jobs: Arc<JobStore>,
        settings: PipelineSettings,
        shutdown: CancellationToken,
    ) -> Self {
        // Create language detector with the languages we support in Cargo.toml
        let language_detector = LanguageDetectorBuilder::from_all_languages().build();

        Self {
            text_source,
            pool,
            assembler,
            publisher,
            jobs,
            language_detector,
            settings,
            shutdown,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }
}

#[async_trait]
pub trait TtsServiceApi: Send + Sync {
    /// Synthesize a whole session and wait for the merged result
    ///
    /// This operation:
    /// - Cleans and segments the text, validates the voice
    /// - Synthesizes every segment with bounded concurrency
    /// - Merges successful segments in order and uploads chunks + merged audio
    ///
    /// Per-segment failures are reported in the response, not raised.
    async fn synthesize(&self, request: SynthesizeRequest) -> Result<SynthesisResponse, TtsServiceError>;

    /// Snapshot of the latest job for a session
    async fn job_status(&self, session_id: &str) -> Result<Job, TtsServiceError>;

    /// Merged audio of a finished job
    async fn merged_audio(&self, session_id: &str) -> Result<(Vec<u8>, AudioEncoding), TtsServiceError>;

    fn describe(&self) -> ServiceStatusResponse;
}

#[async_trait]
impl TtsServiceApi for TtsService {
    async fn synthesize(&self, request: SynthesizeRequest) -> Result<SynthesisResponse, TtsServiceError> {
        let prepared = self.prepare(request).await?;
        let job = self.jobs.create(&prepared.session_id).await?;

        tracing::info!(
            session_id = %prepared.session_id,
            segment_count = prepared.segments.len(),
            concurrency = prepared.concurrency,
            "Synchronous synthesis started"
        );

        let output = self.run_tracked(&prepared, job).await?;
        let chunks = self.chunk_responses(&prepared, &output.collected, output.deadline).await;

        let mut warnings = describe_failures(&output.collected.failed);
        warnings.extend(
            chunks
                .iter()
                .filter(|c| c.url.is_none() && c.base64.is_none() && self.settings.upload_chunks)
                .map(|c| format!("chunk {} could not be uploaded", c.index)),
        );

        Ok(SynthesisResponse {
            session_id: prepared.session_id,
            count: chunks.len(),
            chunks,
            failed: output.collected.failed_indices(),
            merged_url: output.merged_url,
            summary_bytes_approx: output.collected.total_bytes,
            warnings,
        })
    }

    async fn job_status(&self, session_id: &str) -> Result<Job, TtsServiceError> {
        self.jobs
            .get(session_id)
            .await
            .ok_or_else(|| TtsServiceError::NotFound(format!("no job for session {}", session_id)))
    }

    async fn merged_audio(&self, session_id: &str) -> Result<(Vec<u8>, AudioEncoding), TtsServiceError> {
        let job = self.job_status(session_id).await?;
        let (Some(key), Some(encoding)) = (job.result_ref, job.encoding) else {
            return Err(TtsServiceError::NotFound(format!(
                "merged audio for session {} is not ready",
                session_id
            )));
        };

        let bytes = self.publisher.store().get(&key).await?;
        Ok((bytes, encoding))
    }

    fn describe(&self) -> ServiceStatusResponse {
        let client = self.pool.client();
        ServiceStatusResponse {
            provider: client.provider().name().to_string(),
            object_store: self.publisher.store().name().to_string(),
            markup: client.enricher().is_markup(),
            default_concurrency: self.settings.default_concurrency,
            max_concurrency: self.settings.max_concurrency,
            max_segment_bytes: self.settings.max_segment_bytes,
            jobs: self.jobs.len(),
        }
    }
}

impl TtsService {
    /// Queue a background job and return immediately
    pub async fn submit(self: Arc<Self>, request: SynthesizeRequest) -> Result<SubmitResponse, TtsServiceError> {
        let prepared = self.prepare(request).await?;
        let job = self.jobs.create(&prepared.session_id).await?;
        let session_id = prepared.session_id.clone();

        tracing::info!(
            session_id = %session_id,
            segment_count = prepared.segments.len(),
            "Chunked synthesis job queued"
        );

        let service = self.clone();
        tokio::spawn(async move {
            if let Err(err) = service.run_tracked(&prepared, job).await {
                tracing::error!(session_id = %prepared.session_id, error = %err, "Chunked synthesis job failed");
            }
        });

        Ok(SubmitResponse {
            status_url: format!("/tts/{}/status", session_id),
            result_url: format!("/tts/{}/audio", session_id),
            session_id,
        })
    }

    /// Validate the request and turn it into segments plus a checked voice config
    pub async fn prepare(&self, request: SynthesizeRequest) -> Result<PreparedRequest, TtsServiceError> {
        validate_session_id(&request.session_id)?;
        let session_id = request.session_id;

        let raw_text = match request.text.filter(|t| !t.trim().is_empty()) {
            Some(text) => text,
            None => self
                .text_source
                .fetch(&session_id)
                .await?
                .into_iter()
                .map(|(_, text)| text)
                .collect::<Vec<_>>()
                .join(" "),
        };

        let text = clean_text(&raw_text);
        if text.is_empty() {
            return Err(TtsServiceError::NotFound(format!("no text for session {}", session_id)));
        }

        let client = self.pool.client();
        let provider = client.provider();
        let language_code = match request.voice.language_code {
            Some(code) => code,
            None => {
                let detected = detect_language(&self.language_detector, &text);
                tracing::debug!(session_id = %session_id, language = %detected, "Language detected");
                detected.bcp47().to_string()
            }
        };
        let defaults = VoiceConfig::default();
        let audio = request.audio_config;
        let voice = VoiceConfig {
            language_code,
            voice_name: request.voice.name,
            encoding: audio.audio_encoding.unwrap_or(defaults.encoding),
            speaking_rate: audio.speaking_rate.unwrap_or(defaults.speaking_rate),
            pitch: audio.pitch.unwrap_or(defaults.pitch),
            volume_gain_db: audio.volume_gain_db.unwrap_or(defaults.volume_gain_db),
            sample_rate_hertz: audio.sample_rate_hertz,
        };
        voice.validate(provider.name(), provider.supported_encodings())?;

        let max_bytes = request
            .max_segment_bytes
            .map(|requested| requested.min(self.settings.max_segment_bytes))
            .unwrap_or(self.settings.max_segment_bytes);
        let enricher = client.enricher();
        let segments = segment(&text, max_bytes, |candidate| enricher.wire_len(candidate, &voice))?;
        if segments.is_empty() {
            return Err(TtsServiceError::NotFound(format!("no text for session {}", session_id)));
        }

        let concurrency = request
            .concurrency
            .unwrap_or(self.settings.default_concurrency)
            .clamp(1, self.settings.max_concurrency.max(1));

        tracing::info!(
            session_id = %session_id,
            cleaned_length = text.len(),
            segment_count = segments.len(),
            max_segment_bytes = max_bytes,
            language = %voice.language_code,
            encoding = %voice.encoding,
            "Request prepared"
        );

        Ok(PreparedRequest {
            session_id,
            segments,
            voice: Arc::new(voice),
            concurrency,
            return_base64: request.return_base64,
        })
    }

    /// Run the pipeline while publishing job snapshots for the session
    async fn run_tracked(&self, prepared: &PreparedRequest, job: Job) -> Result<PipelineOutput, TtsServiceError> {
        let total = prepared.segments.len();
        let job = job.running(total);
        self.jobs.update(job.clone()).await;

        let (progress_tx, mut progress_rx) = watch::channel((0usize, total));
        let jobs = self.jobs.clone();
        let tracked = job.clone();
        let tracker = tokio::spawn(async move {
            let mut job = tracked;
            while progress_rx.changed().await.is_ok() {
                let (completed, total) = *progress_rx.borrow_and_update();
                job = job.with_progress(completed, total);
                jobs.update(job.clone()).await;
            }
            job
        });

        let mut guard = RunGuard {
            jobs: self.jobs.clone(),
            job,
            tracker: Some(tracker),
            armed: true,
        };

        let result = self
            .run_pipeline(prepared, move |completed, total| {
                let _ = progress_tx.send((completed, total));
            })
            .await;
        let job = guard.settle().await;

        match &result {
            Ok(output) => {
                let job = job.done(
                    output.merged_key.clone(),
                    output.merged_url.clone(),
                    output.merged.encoding,
                    output.collected.failed_indices(),
                );
                self.jobs.update(job).await;
            }
            Err(err) => {
                let failed = match err {
                    TtsServiceError::AllSegmentsFailed { failed, .. }
                    | TtsServiceError::Timeout { failed, .. }
                    | TtsServiceError::Cancelled { failed }
                    | TtsServiceError::Dependency { failed, .. } => failed.clone(),
                    _ => Vec::new(),
                };
                self.jobs.update(job.failed(err.to_string(), failed)).await;
            }
        }
        guard.disarm();

        result
    }

    /// Segments → bounded fan-out → ordered collection → merge → upload
    pub async fn run_pipeline<P>(&self, prepared: &PreparedRequest, on_progress: P) -> Result<PipelineOutput, TtsServiceError>
    where
        P: FnMut(usize, usize) + Send,
    {
        let total = prepared.segments.len();
        let tasks: Vec<SynthesisTask> = prepared
            .segments
            .iter()
            .map(|segment| SynthesisTask {
                segment: segment.clone(),
                voice: prepared.voice.clone(),
            })
            .collect();

        let deadline = self.settings.request_timeout.map(|t| Instant::now() + t);
        let options = PoolOptions {
            max_concurrency: prepared.concurrency,
            failure_policy: self.settings.failure_policy,
            retry: self.settings.synthesis_retry,
            deadline,
        };
        let cancel = self.shutdown.child_token();

        let run = self.pool.run(tasks, &options, &cancel, on_progress).await;
        let completed = run.completed;
        let first_failure = run.outcomes.iter().find_map(|outcome| match outcome {
            SynthesisOutcome::Failure { index, kind, message } if *kind != FailureKind::Cancelled => {
                Some(format!("segment {} failed: {}", index, message))
            }
            _ => None,
        });
        let collected = collect(run.outcomes);

        match run.interruption {
            Some(Interruption::DeadlineExceeded) => {
                return Err(TtsServiceError::Timeout {
                    completed,
                    total,
                    failed: collected.failed_indices(),
                });
            }
            Some(Interruption::Cancelled) => {
                return Err(TtsServiceError::Cancelled {
                    failed: collected.failed_indices(),
                });
            }
            Some(Interruption::AbortedOnFailure) => {
                return Err(TtsServiceError::Dependency {
                    message: first_failure.unwrap_or_else(|| "a segment failed".to_string()),
                    failed: collected.failed_indices(),
                });
            }
            None => {}
        }

        if collected.succeeded.is_empty() {
            return Err(TtsServiceError::AllSegmentsFailed {
                total,
                failed: collected.failed_indices(),
            });
        }
        if collected.is_partial() {
            tracing::warn!(
                session_id = %prepared.session_id,
                failed = ?collected.failed_indices(),
                succeeded = collected.succeeded.len(),
                "Partial synthesis, merging successful segments only"
            );
        }

        let timed_out = |collected: &Collected| TtsServiceError::Timeout {
            completed,
            total,
            failed: collected.failed_indices(),
        };

        let encoding = prepared.voice.encoding;
        let merged = until_deadline(deadline, self.assembler.assemble(collected.buffers(), encoding))
            .await
            .ok_or_else(|| timed_out(&collected))??;

        let key = merged_key(&prepared.session_id, encoding);
        let merged_url = until_deadline(
            deadline,
            self.publisher.publish(merged.bytes.clone(), &key, encoding.mime_type()),
        )
        .await
        .ok_or_else(|| timed_out(&collected))??;

        tracing::info!(
            session_id = %prepared.session_id,
            segment_count = total,
            succeeded = collected.succeeded.len(),
            merged_size = merged.byte_count,
            url = %merged_url,
            "Merged audio published"
        );

        Ok(PipelineOutput {
            collected,
            merged,
            merged_key: key,
            merged_url,
            deadline,
        })
    }

    /// Upload or encode every successful chunk. Failed uploads leave `url` empty.
    async fn chunk_responses(
        &self,
        prepared: &PreparedRequest,
        collected: &Collected,
        deadline: Option<Instant>,
    ) -> Vec<ChunkResponse> {
        let encoding = prepared.voice.encoding;

        if prepared.return_base64 {
            return collected
                .succeeded
                .iter()
                .map(|(index, audio)| ChunkResponse {
                    index: *index,
                    url: None,
                    base64: Some(base64::engine::general_purpose::STANDARD.encode(audio)),
                    bytes_approx: audio.len(),
                })
                .collect();
        }

        if !self.settings.upload_chunks {
            return collected
                .succeeded
                .iter()
                .map(|(index, audio)| ChunkResponse {
                    index: *index,
                    url: None,
                    base64: None,
                    bytes_approx: audio.len(),
                })
                .collect();
        }

        let uploads: Vec<(usize, Vec<u8>, String)> = collected
            .succeeded
            .iter()
            .map(|(index, audio)| (*index, audio.clone(), chunk_key(&prepared.session_id, *index, encoding)))
            .collect();
        let publisher = self.publisher.clone();

        futures::stream::iter(uploads)
            .map(move |(index, audio, key)| {
                let publisher = publisher.clone();
                async move {
                    let bytes_approx = audio.len();
                    let url = match until_deadline(deadline, publisher.publish(audio, &key, encoding.mime_type())).await {
                        Some(Ok(url)) => Some(url),
                        Some(Err(err)) => {
                            tracing::warn!(segment_index = index, error = %err, "Chunk upload failed");
                            None
                        }
                        None => {
                            tracing::warn!(segment_index = index, "Chunk upload skipped, request deadline passed");
                            None
                        }
                    };
                    ChunkResponse {
                        index,
                        url,
                        base64: None,
                        bytes_approx,
                    }
                }
            })
            .buffered(prepared.concurrency)
            .collect()
            .await
    }
}

/// Run `fut` to completion, or give up once `deadline` passes
async fn until_deadline<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

fn validate_session_id(session_id: &str) -> Result<(), TtsServiceError> {
    if session_id.is_empty() {
        return Err(TtsServiceError::Invalid("sessionId is required".to_string()));
    }
    let valid = session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(TtsServiceError::Invalid(format!(
            "sessionId '{}' must be 1-{} characters of letters, digits, '-' or '_'",
            session_id, MAX_SESSION_ID_LEN
        )));
    }
    Ok(())
}

/// Clean text by removing HTML tags and URLs and normalizing whitespace
pub fn clean_text(text: &str) -> String {
    let plain_text = from_read(text.as_bytes(), usize::MAX);
    let without_urls = URL_PATTERN.replace_all(&plain_text, "");
    let normalized = WHITESPACE_PATTERN.replace_all(&without_urls, " ");
    normalized.trim().to_string()
}

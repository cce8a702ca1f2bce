use super::collector::FailedSegment;
use super::job::{Job, JobStatus};
use super::voice::AudioEncoding;
use serde::{Deserialize, Serialize};

/// Request for POST /tts and POST /tts/chunked
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizeRequest {
    #[serde(default)]
    pub session_id: String,
    /// Inline text; when absent the session's uploaded text chunks are used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub voice: VoiceParams,
    #[serde(default)]
    pub audio_config: AudioConfigParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub return_base64: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_segment_bytes: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfigParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_encoding: Option<AudioEncoding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaking_rate: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_gain_db: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate_hertz: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
    pub bytes_approx: usize,
}

/// Response for POST /tts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisResponse {
    pub session_id: String,
    pub count: usize,
    pub chunks: Vec<ChunkResponse>,
    pub failed: Vec<usize>,
    pub merged_url: String,
    pub summary_bytes_approx: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Response for POST /tts/chunked
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub session_id: String,
    pub status_url: String,
    pub result_url: String,
}

/// Response for GET /tts/:sessionId/status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub session_id: String,
    pub status: String,
    pub progress: u8,
    pub completed: usize,
    pub total: usize,
    pub failed: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        let status = match job.status {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        };
        Self {
            session_id: job.session_id,
            status: status.to_string(),
            progress: job.progress,
            completed: job.completed,
            total: job.total,
            failed: job.failed,
            result_url: job.result_url,
            error: job.error_message,
        }
    }
}

/// Request for POST /tts/:sessionId/program
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intro_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outro_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramResponse {
    pub session_id: String,
    pub url: String,
    pub bytes: usize,
}

/// Response for GET /status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatusResponse {
    pub provider: String,
    pub object_store: String,
    pub markup: bool,
    pub default_concurrency: usize,
    pub max_concurrency: usize,
    pub max_segment_bytes: usize,
    pub jobs: u64,
}

/// Per-segment failure detail carried in warnings
pub fn describe_failures(failed: &[FailedSegment]) -> Vec<String> {
    failed
        .iter()
        .map(|f| format!("segment {} failed ({:?}): {}", f.index, f.kind, f.message))
        .collect()
}

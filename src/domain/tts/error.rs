use super::job::JobConflict;
use super::publisher::PublishError;
use super::segmenter::SegmentError;
use super::voice::VoiceConfigError;
use crate::domain::audio::{AssemblyError, ProgramError};
use crate::error::AppError;
use crate::infrastructure::repositories::{ObjectStoreError, TextSourceError};

#[derive(Debug, thiserror::Error)]
pub enum TtsServiceError {
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("all {total} segments failed to synthesize")]
    AllSegmentsFailed { total: usize, failed: Vec<usize> },
    #[error("audio assembly failed: {0}")]
    Assembly(#[from] AssemblyError),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("timed out with {completed}/{total} segments completed")]
    Timeout {
        completed: usize,
        total: usize,
        failed: Vec<usize>,
    },
    #[error("synthesis was cancelled")]
    Cancelled { failed: Vec<usize> },
    #[error("dependency error: {message}")]
    Dependency { message: String, failed: Vec<usize> },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<VoiceConfigError> for TtsServiceError {
    fn from(err: VoiceConfigError) -> Self {
        TtsServiceError::Invalid(err.to_string())
    }
}

impl From<SegmentError> for TtsServiceError {
    fn from(err: SegmentError) -> Self {
        TtsServiceError::Invalid(err.to_string())
    }
}

impl From<JobConflict> for TtsServiceError {
    fn from(err: JobConflict) -> Self {
        TtsServiceError::Conflict(err.to_string())
    }
}

impl From<PublishError> for TtsServiceError {
    fn from(err: PublishError) -> Self {
        TtsServiceError::Storage(err.to_string())
    }
}

impl From<ObjectStoreError> for TtsServiceError {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::NotFound(key) => TtsServiceError::NotFound(format!("object {}", key)),
            other => TtsServiceError::Storage(other.to_string()),
        }
    }
}

impl From<TextSourceError> for TtsServiceError {
    fn from(err: TextSourceError) -> Self {
        match err {
            TextSourceError::Store(store) => store.into(),
            other => TtsServiceError::Invalid(other.to_string()),
        }
    }
}

impl From<ProgramError> for TtsServiceError {
    fn from(err: ProgramError) -> Self {
        match err {
            ProgramError::Assembly(inner) => TtsServiceError::Assembly(inner),
            other => TtsServiceError::Invalid(other.to_string()),
        }
    }
}

impl From<TtsServiceError> for AppError {
    fn from(err: TtsServiceError) -> Self {
        match err {
            TtsServiceError::Invalid(msg) => AppError::BadRequest(msg),
            TtsServiceError::NotFound(msg) => AppError::NotFound(msg),
            TtsServiceError::Conflict(msg) => AppError::Conflict(msg),
            TtsServiceError::AllSegmentsFailed { total, failed } => AppError::SynthesisFailed {
                message: format!("all {} segments failed to synthesize", total),
                failed,
            },
            TtsServiceError::Timeout { completed, total, failed } => AppError::ServiceUnavailable {
                message: format!("timed out with {}/{} segments completed", completed, total),
                failed,
            },
            TtsServiceError::Cancelled { failed } => AppError::ServiceUnavailable {
                message: "synthesis was cancelled".to_string(),
                failed,
            },
            TtsServiceError::Dependency { message, failed } => AppError::ExternalService { message, failed },
            TtsServiceError::Assembly(e) => AppError::Internal(format!("audio assembly failed: {}", e)),
            TtsServiceError::Storage(msg) => AppError::Internal(format!("storage error: {}", msg)),
            TtsServiceError::Other(e) => AppError::Internal(e.to_string()),
        }
    }
}

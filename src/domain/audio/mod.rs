pub mod ffmpeg;
pub mod program;
pub mod service;

use crate::domain::tts::AudioEncoding;
use async_trait::async_trait;

pub use ffmpeg::FfmpegConcatAssembler;
pub use program::{ProgramAssembler, ProgramError, ProgramSettings};
pub use service::{ProgramResult, ProgramService, ProgramServiceApi};

/// One playable file built from ordered segment audio
#[derive(Debug, Clone)]
pub struct MergedAudio {
    pub bytes: Vec<u8>,
    pub byte_count: usize,
    pub segment_count: usize,
    pub encoding: AudioEncoding,
}

impl MergedAudio {
    fn new(bytes: Vec<u8>, segment_count: usize, encoding: AudioEncoding) -> Self {
        Self {
            byte_count: bytes.len(),
            bytes,
            segment_count,
            encoding,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("nothing to assemble")]
    Empty,
    #[error("scratch file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: &'static str,
        status: String,
        stderr: String,
    },
    #[error("could not read {tool} output: {message}")]
    Probe { tool: &'static str, message: String },
}

/// Concatenates ordered audio buffers into one file.
///
/// Input order is track order. Implementations never reorder, pad or crossfade.
#[async_trait]
pub trait AudioAssembler: Send + Sync {
    async fn assemble(&self, buffers: Vec<Vec<u8>>, encoding: AudioEncoding) -> Result<MergedAudio, AssemblyError>;
}

/// In-memory concatenation. Only correct for headerless streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteConcatAssembler;

#[async_trait]
impl AudioAssembler for ByteConcatAssembler {
    async fn assemble(&self, buffers: Vec<Vec<u8>>, encoding: AudioEncoding) -> Result<MergedAudio, AssemblyError> {
        if buffers.is_empty() {
            return Err(AssemblyError::Empty);
        }
        let segment_count = buffers.len();
        let bytes = buffers.concat();
        tracing::debug!(segment_count, merged_size = bytes.len(), "Audio concatenated in memory");
        Ok(MergedAudio::new(bytes, segment_count, encoding))
    }
}

/// Byte concatenation for headerless codecs, container-aware merge for the rest
pub struct CodecAwareAssembler {
    bytes: ByteConcatAssembler,
    container: FfmpegConcatAssembler,
    force_bytes: bool,
}

impl CodecAwareAssembler {
    pub fn new(container: FfmpegConcatAssembler, force_bytes: bool) -> Self {
        Self {
            bytes: ByteConcatAssembler,
            container,
            force_bytes,
        }
    }

    fn uses_bytes(&self, encoding: AudioEncoding) -> bool {
        self.force_bytes || encoding.is_headerless()
    }
}

#[async_trait]
impl AudioAssembler for CodecAwareAssembler {
    async fn assemble(&self, buffers: Vec<Vec<u8>>, encoding: AudioEncoding) -> Result<MergedAudio, AssemblyError> {
        if self.uses_bytes(encoding) {
            self.bytes.assemble(buffers, encoding).await
        } else {
            self.container.assemble(buffers, encoding).await
        }
    }
}

pub mod collector;
pub mod dto;
pub mod error;
pub mod job;
pub mod language;
pub mod markup;
pub mod pool;
pub mod publisher;
pub mod segmenter;
pub mod service;
pub mod synthesis;
pub mod voice;

pub use collector::{collect, Collected, FailedSegment};
pub use error::TtsServiceError;
pub use job::{Job, JobStatus, JobStore};
pub use language::{detect_language, LanguageCode};
pub use markup::{MarkupEnricher, PlainTextEnricher, SsmlEnricher};
pub use pool::{FailurePolicy, PoolOptions, WorkerPool};
pub use publisher::Publisher;
pub use segmenter::{segment, Segment};
pub use service::{PipelineSettings, TtsService, TtsServiceApi};
pub use synthesis::{FailureKind, SynthesisClient, SynthesisOutcome, SynthesisTask};
pub use voice::{AudioEncoding, VoiceConfig};

pub mod google_tts_repository;
pub mod local_object_store;
pub mod object_store_repository;
pub mod openai_tts_repository;
pub mod polly_tts_repository;
pub mod s3_object_store;
pub mod text_source_repository;
pub mod tts_repository;

pub use google_tts_repository::GoogleTtsRepository;
pub use local_object_store::LocalObjectStore;
pub use object_store_repository::{ObjectStore, ObjectStoreError};
pub use openai_tts_repository::OpenAiTtsRepository;
pub use polly_tts_repository::PollyTtsRepository;
pub use s3_object_store::S3ObjectStore;
pub use text_source_repository::{ObjectStoreTextSource, TextSource, TextSourceError};
pub use tts_repository::{ProviderError, SynthesisRequest, TtsRepository};

use crate::domain::tts::FailurePolicy;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub aws_region: String,
    pub environment: Environment,
    pub log_format: LogFormat,
    // Provider
    pub tts_provider: TtsProviderKind,
    pub google_tts_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_tts_model: String,
    pub markup_enabled: bool,
    pub tts_cache_enabled: bool,
    // Object store
    pub object_store: ObjectStoreKind,
    pub s3_bucket: String,
    pub s3_endpoint_url: Option<String>,
    pub public_base_url: Option<String>,
    pub local_store_dir: String,
    // Pipeline
    pub tts_concurrency: usize,
    pub tts_max_concurrency: usize,
    pub max_segment_bytes: usize,
    pub synthesis_timeout_secs: u64,
    pub synthesis_max_attempts: u32,
    pub request_timeout_secs: u64,
    pub failure_policy: FailurePolicy,
    pub upload_chunks: bool,
    pub upload_max_attempts: u32,
    pub upload_base_delay_ms: u64,
    pub upload_max_delay_ms: u64,
    pub upload_timeout_secs: u64,
    pub job_ttl_secs: u64,
    // Audio
    pub audio_concat_mode: ConcatMode,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub program_intro_key: Option<String>,
    pub program_outro_key: Option<String>,
    pub program_min_intro_secs: f64,
    pub program_min_outro_secs: f64,
    pub program_fade_secs: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TtsProviderKind {
    Polly,
    Google,
    OpenAi,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStoreKind {
    S3,
    Local,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConcatMode {
    /// Byte concatenation for headerless codecs, ffmpeg for the rest
    Auto,
    Bytes,
}

fn flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|s| s.to_lowercase() == "true")
        .unwrap_or(default)
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let config = Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "eu-west-1".to_string()),
            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string())
                .parse::<String>()
                .map(|s| match s.as_str() {
                    "production" => Environment::Production,
                    _ => Environment::Development,
                })?,
            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .parse::<String>()
                .map(|s| match s.as_str() {
                    "json" => LogFormat::Json,
                    _ => LogFormat::Pretty,
                })?,
            tts_provider: match env::var("TTS_PROVIDER")
                .unwrap_or_else(|_| "polly".to_string())
                .to_lowercase()
                .as_str()
            {
                "polly" => TtsProviderKind::Polly,
                "google" => TtsProviderKind::Google,
                "openai" => TtsProviderKind::OpenAi,
                other => return Err(format!("unknown TTS_PROVIDER: {}", other).into()),
            },
            google_tts_api_key: optional("GOOGLE_TTS_API_KEY"),
            openai_api_key: optional("OPENAI_API_KEY"),
            openai_tts_model: env::var("OPENAI_TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string()),
            markup_enabled: flag("MARKUP_ENABLED", true),
            tts_cache_enabled: flag("TTS_CACHE_ENABLED", false),
            object_store: match env::var("OBJECT_STORE")
                .unwrap_or_else(|_| "s3".to_string())
                .to_lowercase()
                .as_str()
            {
                "s3" => ObjectStoreKind::S3,
                "local" => ObjectStoreKind::Local,
                other => return Err(format!("unknown OBJECT_STORE: {}", other).into()),
            },
            s3_bucket: env::var("S3_BUCKET").unwrap_or_default(),
            s3_endpoint_url: optional("S3_ENDPOINT_URL"),
            public_base_url: optional("PUBLIC_BASE_URL"),
            local_store_dir: env::var("LOCAL_STORE_DIR").unwrap_or_else(|_| "./data".to_string()),
            tts_concurrency: env::var("TTS_CONCURRENCY")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            tts_max_concurrency: env::var("TTS_MAX_CONCURRENCY")
                .unwrap_or_else(|_| "16".to_string())
                .parse()?,
            max_segment_bytes: env::var("MAX_SEGMENT_BYTES")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            synthesis_timeout_secs: env::var("SYNTHESIS_TIMEOUT_SECS")
                .unwrap_or_else(|_| "45".to_string())
                .parse()?,
            synthesis_max_attempts: env::var("SYNTHESIS_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()?,
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
            failure_policy: match env::var("FAILURE_POLICY")
                .unwrap_or_else(|_| "best_effort".to_string())
                .to_lowercase()
                .as_str()
            {
                "best_effort" => FailurePolicy::BestEffort,
                "abort_on_first_failure" => FailurePolicy::AbortOnFirstFailure,
                other => return Err(format!("unknown FAILURE_POLICY: {}", other).into()),
            },
            upload_chunks: flag("UPLOAD_CHUNKS", true),
            upload_max_attempts: env::var("UPLOAD_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            upload_base_delay_ms: env::var("UPLOAD_BASE_DELAY_MS")
                .unwrap_or_else(|_| "250".to_string())
                .parse()?,
            upload_max_delay_ms: env::var("UPLOAD_MAX_DELAY_MS")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()?,
            upload_timeout_secs: env::var("UPLOAD_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            job_ttl_secs: env::var("JOB_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()?,
            audio_concat_mode: match env::var("AUDIO_CONCAT_MODE")
                .unwrap_or_else(|_| "auto".to_string())
                .to_lowercase()
                .as_str()
            {
                "bytes" => ConcatMode::Bytes,
                _ => ConcatMode::Auto,
            },
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
            program_intro_key: optional("PROGRAM_INTRO_KEY"),
            program_outro_key: optional("PROGRAM_OUTRO_KEY"),
            program_min_intro_secs: env::var("PROGRAM_MIN_INTRO_SECS")
                .unwrap_or_else(|_| "2.0".to_string())
                .parse()?,
            program_min_outro_secs: env::var("PROGRAM_MIN_OUTRO_SECS")
                .unwrap_or_else(|_| "2.0".to_string())
                .parse()?,
            program_fade_secs: env::var("PROGRAM_FADE_SECS")
                .unwrap_or_else(|_| "1.0".to_string())
                .parse()?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.object_store == ObjectStoreKind::S3 && self.s3_bucket.is_empty() {
            return Err("S3_BUCKET is required when OBJECT_STORE=s3".into());
        }
        if self.tts_provider == TtsProviderKind::Google && self.google_tts_api_key.is_none() {
            return Err("GOOGLE_TTS_API_KEY is required when TTS_PROVIDER=google".into());
        }
        if self.tts_provider == TtsProviderKind::OpenAi && self.openai_api_key.is_none() {
            return Err("OPENAI_API_KEY is required when TTS_PROVIDER=openai".into());
        }
        if self.tts_concurrency == 0 || self.tts_max_concurrency < self.tts_concurrency {
            return Err("TTS_CONCURRENCY must be between 1 and TTS_MAX_CONCURRENCY".into());
        }
        if self.max_segment_bytes < 64 {
            return Err("MAX_SEGMENT_BYTES must be at least 64".into());
        }
        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

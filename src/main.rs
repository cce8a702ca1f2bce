use async_openai::{config::OpenAIConfig, Client as OpenAIClient};
use longform_tts::controllers::{program::ProgramController, tts::TtsController};
use longform_tts::domain::audio::{
    AudioAssembler, CodecAwareAssembler, FfmpegConcatAssembler, ProgramAssembler, ProgramService, ProgramSettings,
};
use longform_tts::domain::shared::RetryPolicy;
use longform_tts::domain::tts::{
    JobStore, MarkupEnricher, PipelineSettings, PlainTextEnricher, Publisher, SsmlEnricher, SynthesisClient,
    TtsService, WorkerPool,
};
use longform_tts::error::hide_internal_errors;
use longform_tts::infrastructure::config::{Config, ConcatMode, LogFormat, ObjectStoreKind, TtsProviderKind};
use longform_tts::infrastructure::http::{build_router, start_http_server};
use longform_tts::infrastructure::repositories::{
    GoogleTtsRepository, LocalObjectStore, ObjectStore, ObjectStoreTextSource, OpenAiTtsRepository,
    PollyTtsRepository, S3ObjectStore, TextSource, TtsRepository,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    init_logging(&config);
    hide_internal_errors(!config.is_development());

    tracing::info!(
        "Starting long-form TTS service on {}:{}",
        config.host,
        config.port
    );

    let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(config.aws_region.clone()))
        .load()
        .await;

    tracing::info!(
        region = ?aws_config.region(),
        "AWS configuration loaded"
    );

    let config = Arc::new(config);
    let shutdown = CancellationToken::new();

    // === DEPENDENCY INJECTION SETUP ===
    // 1. Instantiate repositories (provider, object store, text source)
    tracing::info!("Instantiating repositories...");
    let provider: Arc<dyn TtsRepository> = match config.tts_provider {
        TtsProviderKind::Polly => {
            let polly_client = Arc::new(aws_sdk_polly::Client::new(&aws_config));
            Arc::new(PollyTtsRepository::new(polly_client))
        }
        TtsProviderKind::Google => {
            let api_key = config.google_tts_api_key.clone().unwrap_or_default();
            Arc::new(GoogleTtsRepository::new(api_key))
        }
        TtsProviderKind::OpenAi => {
            let openai_config = OpenAIConfig::new().with_api_key(config.openai_api_key.clone().unwrap_or_default());
            let openai_client = Arc::new(OpenAIClient::with_config(openai_config));
            Arc::new(OpenAiTtsRepository::new(
                openai_client,
                config.openai_tts_model.clone(),
                "alloy".to_string(),
            ))
        }
    };
    // Polly takes prosody only through SSML; OpenAI has no SSML support
    let enricher: Arc<dyn MarkupEnricher> = match config.tts_provider {
        _ if !config.markup_enabled => Arc::new(PlainTextEnricher),
        TtsProviderKind::Polly => Arc::new(SsmlEnricher::with_prosody()),
        TtsProviderKind::Google => Arc::new(SsmlEnricher::new()),
        TtsProviderKind::OpenAi => Arc::new(PlainTextEnricher),
    };
    tracing::info!(provider = provider.name(), markup = enricher.is_markup(), "TTS provider selected");

    let object_store: Arc<dyn ObjectStore> = match config.object_store {
        ObjectStoreKind::S3 => {
            let mut s3_config = aws_sdk_s3::config::Builder::from(&aws_config);
            if let Some(endpoint) = &config.s3_endpoint_url {
                s3_config = s3_config.endpoint_url(endpoint).force_path_style(true);
            }
            let s3_client = Arc::new(aws_sdk_s3::Client::from_conf(s3_config.build()));
            let base_url = config.public_base_url.clone().unwrap_or_else(|| {
                S3ObjectStore::default_base_url(&config.s3_bucket, &config.aws_region, config.s3_endpoint_url.as_deref())
            });
            Arc::new(S3ObjectStore::new(s3_client, config.s3_bucket.clone(), base_url))
        }
        ObjectStoreKind::Local => {
            let base_url = config
                .public_base_url
                .clone()
                .unwrap_or_else(|| format!("file://{}", config.local_store_dir));
            Arc::new(LocalObjectStore::new(config.local_store_dir.clone(), base_url))
        }
    };
    tracing::info!(object_store = object_store.name(), "Object store selected");

    let text_source: Arc<dyn TextSource> = Arc::new(ObjectStoreTextSource::new(object_store.clone()));

    // 2. Instantiate pipeline components
    tracing::info!("Instantiating pipeline components...");
    let synthesis_client = Arc::new(SynthesisClient::new(
        provider,
        enricher,
        Duration::from_secs(config.synthesis_timeout_secs),
        config.tts_cache_enabled,
    ));
    let pool = WorkerPool::new(synthesis_client);

    let ffmpeg = FfmpegConcatAssembler::new(&config.ffmpeg_path);
    let assembler: Arc<dyn AudioAssembler> = Arc::new(CodecAwareAssembler::new(
        ffmpeg.clone(),
        config.audio_concat_mode == ConcatMode::Bytes,
    ));

    let upload_retry = RetryPolicy::new(
        config.upload_max_attempts,
        Duration::from_millis(config.upload_base_delay_ms),
        Duration::from_millis(config.upload_max_delay_ms),
    );
    let publisher = Arc::new(Publisher::new(
        object_store.clone(),
        upload_retry,
        Duration::from_secs(config.upload_timeout_secs),
    ));
    let jobs = Arc::new(JobStore::new(Duration::from_secs(config.job_ttl_secs)));

    // 3. Instantiate services
    tracing::info!("Instantiating services...");
    let settings = PipelineSettings {
        default_concurrency: config.tts_concurrency,
        max_concurrency: config.tts_max_concurrency,
        max_segment_bytes: config.max_segment_bytes,
        failure_policy: config.failure_policy,
        synthesis_retry: RetryPolicy::new(
            config.synthesis_max_attempts,
            Duration::from_millis(500),
            Duration::from_secs(8),
        ),
        request_timeout: Some(Duration::from_secs(config.request_timeout_secs)).filter(|d| !d.is_zero()),
        upload_chunks: config.upload_chunks,
    };
    let tts_service = Arc::new(TtsService::new(
        text_source,
        pool,
        assembler,
        publisher.clone(),
        jobs.clone(),
        settings,
        shutdown.clone(),
    ));

    let program_settings = ProgramSettings {
        ffmpeg: config.ffmpeg_path.clone().into(),
        ffprobe: config.ffprobe_path.clone().into(),
        min_intro_secs: config.program_min_intro_secs,
        min_outro_secs: config.program_min_outro_secs,
        fade_secs: config.program_fade_secs,
        scratch_dir: None,
    };
    let program_service = Arc::new(ProgramService::new(
        ProgramAssembler::new(Arc::new(ffmpeg), program_settings),
        publisher,
        jobs,
        config.program_intro_key.clone(),
        config.program_outro_key.clone(),
    ));

    // 4. Instantiate controllers (inject services)
    tracing::info!("Instantiating controllers...");
    let tts_controller = Arc::new(TtsController::new(tts_service));
    let program_controller = Arc::new(ProgramController::new(program_service));

    // Ctrl-C cancels running jobs and stops accepting requests
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    // Start HTTP server with all routes
    let app = build_router(tts_controller, program_controller);
    start_http_server(config, app, shutdown).await?;

    Ok(())
}

fn init_logging(config: &Config) {
    if config.log_format == LogFormat::Json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "longform_tts=debug,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "longform_tts=debug,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

pub mod request_id;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::controllers::{health, program::ProgramController, tts::TtsController};
use crate::infrastructure::config::Config;

pub use request_id::{request_id_middleware, RequestId, X_REQUEST_ID};

/// Build the application router. Shared by the binary and the end-to-end tests.
pub fn build_router(tts_controller: Arc<TtsController>, program_controller: Arc<ProgramController>) -> Router {
    let tts_routes = Router::new()
        .route("/tts", post(TtsController::synthesize))
        .route("/tts/sync", post(TtsController::synthesize))
        .route("/tts/chunked", post(TtsController::submit))
        .route("/tts/:sessionId/status", get(TtsController::status))
        .route("/tts/:sessionId/audio", get(TtsController::audio))
        .route("/status", get(TtsController::service_status))
        .with_state(tts_controller);

    let program_routes = Router::new()
        .route("/tts/:sessionId/program", post(ProgramController::create_program))
        .with_state(program_controller);

    Router::new()
        .route("/health", get(health::health))
        .merge(tts_routes)
        .merge(program_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server; returns once `shutdown` fires and in-flight requests drain
pub async fn start_http_server(
    config: Arc<Config>,
    app: Router,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;

    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use std::sync::Arc;

use crate::{
    domain::tts::{
        dto::{JobStatusResponse, ServiceStatusResponse, SubmitResponse, SynthesisResponse, SynthesizeRequest},
        TtsService, TtsServiceApi,
    },
    error::{AppError, AppResult},
};

pub struct TtsController {
    tts_service: Arc<TtsService>,
}

impl TtsController {
    pub fn new(tts_service: Arc<TtsService>) -> Self {
        Self { tts_service }
    }

    /// POST /tts - Synthesize a session and wait for the merged result
    pub async fn synthesize(
        State(controller): State<Arc<TtsController>>,
        payload: Result<Json<SynthesizeRequest>, JsonRejection>,
    ) -> AppResult<Json<SynthesisResponse>> {
        let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

        let response = controller.tts_service.synthesize(request).await?;

        Ok(Json(response))
    }

    /// POST /tts/chunked - Queue a background job
    pub async fn submit(
        State(controller): State<Arc<TtsController>>,
        payload: Result<Json<SynthesizeRequest>, JsonRejection>,
    ) -> AppResult<(StatusCode, Json<SubmitResponse>)> {
        let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

        let response = controller.tts_service.clone().submit(request).await?;

        Ok((StatusCode::ACCEPTED, Json(response)))
    }

    /// GET /tts/:sessionId/status
    pub async fn status(
        State(controller): State<Arc<TtsController>>,
        Path(session_id): Path<String>,
    ) -> AppResult<Json<JobStatusResponse>> {
        let job = controller.tts_service.job_status(&session_id).await?;
        Ok(Json(job.into()))
    }

    /// GET /tts/:sessionId/audio - Merged audio with its MIME type
    pub async fn audio(
        State(controller): State<Arc<TtsController>>,
        Path(session_id): Path<String>,
    ) -> AppResult<(StatusCode, HeaderMap, Body)> {
        let (bytes, encoding) = controller.tts_service.merged_audio(&session_id).await?;

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(encoding.mime_type()));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        if let Ok(disposition) = HeaderValue::from_str(&format!(
            "inline; filename=\"{}.{}\"",
            session_id,
            encoding.extension()
        )) {
            headers.insert(header::CONTENT_DISPOSITION, disposition);
        }

        Ok((StatusCode::OK, headers, Body::from(bytes)))
    }

    /// GET /status
    pub async fn service_status(State(controller): State<Arc<TtsController>>) -> Json<ServiceStatusResponse> {
        Json(controller.tts_service.describe())
    }
}

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::{
    domain::{
        audio::{ProgramService, ProgramServiceApi},
        tts::dto::{ProgramRequest, ProgramResponse},
    },
    error::{AppError, AppResult},
};

pub struct ProgramController {
    program_service: Arc<ProgramService>,
}

impl ProgramController {
    pub fn new(program_service: Arc<ProgramService>) -> Self {
        Self { program_service }
    }

    /// POST /tts/:sessionId/program - Wrap merged audio with intro and outro
    pub async fn create_program(
        State(controller): State<Arc<ProgramController>>,
        Path(session_id): Path<String>,
        body: Bytes,
    ) -> AppResult<Json<ProgramResponse>> {
        // an empty body means "use the configured intro and outro"
        let request: ProgramRequest = if body.is_empty() {
            ProgramRequest::default()
        } else {
            serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?
        };

        let result = controller
            .program_service
            .create_program(&session_id, request.intro_key, request.outro_key)
            .await?;

        Ok(Json(ProgramResponse {
            session_id: result.session_id,
            url: result.url,
            bytes: result.bytes,
        }))
    }
}

//! GET /v1/lesson-status/{summary_id}

use axum::extract::{Path, State};
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct LessonStatusResponse {
    pub summary_id: i64,
    pub status: String,
    pub processing_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub exercises_generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exercises_id: Option<i64>,
    pub transcript_available: bool,
    pub transcript_length: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
}

/// GET /v1/lesson-status/:summary_id
pub async fn lesson_status(
    State(state): State<AppState>,
    Path(summary_id): Path<i64>,
) -> ApiResult<Json<LessonStatusResponse>> {
    let artifact = state
        .analytical
        .get_summary(summary_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("summary {summary_id}")))?;

    let exercise_set = state.analytical.exercise_set_for(summary_id).await?;

    Ok(Json(LessonStatusResponse {
        summary_id: artifact.summary_id,
        status: artifact.status.as_str().to_string(),
        processing_attempts: artifact.processing_attempts,
        last_error: artifact.last_error,
        exercises_generated: exercise_set.is_some(),
        exercises_id: exercise_set.map(|s| s.exercises_id),
        transcript_available: artifact.transcript.as_deref().is_some_and(|t| !t.is_empty()),
        transcript_length: artifact.transcript_length,
        processed_at: artifact.processed_at.map(|t| t.to_rfc3339()),
    }))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/lesson-status/:summary_id", get(lesson_status))
}

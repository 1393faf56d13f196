//! POST /v1/trigger
//!
//! Creates the transcript artifact for a lesson (idempotently on the
//! business key) and forwards the payload to the external workflow.
//! Duplicate calls return the existing row; an incompatible duplicate
//! (same key, different teacher email) is a conflict.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::post, Json, Router};
use lessonpipe_common::dispatch::WebhookPayload;
use lessonpipe_common::models::NewTranscriptArtifact;
use lessonpipe_common::stores::InsertOutcome;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

static DATE_FORMAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static TIME_FORMAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}:\d{2}$").unwrap());

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerRequest {
    pub user_id: String,
    pub teacher_id: String,
    pub class_id: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub start_time: String,
    /// `HH:MM`
    pub end_time: String,
    pub teacher_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PollUrls {
    pub status: String,
    pub exercises: String,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub summary_id: i64,
    pub status: String,
    pub class_id: String,
    pub date: String,
    pub poll_urls: PollUrls,
}

fn validate_clock(field: &str, value: &str) -> ApiResult<()> {
    if !TIME_FORMAT.is_match(value) {
        return Err(ApiError::BadRequest(format!(
            "{field} must be HH:MM, got '{value}'"
        )));
    }
    let (hours, minutes) = value.split_once(':').unwrap_or(("99", "99"));
    let in_range = hours.parse::<u32>().map(|h| h < 24).unwrap_or(false)
        && minutes.parse::<u32>().map(|m| m < 60).unwrap_or(false);
    if !in_range {
        return Err(ApiError::BadRequest(format!(
            "{field} is out of range: '{value}'"
        )));
    }
    Ok(())
}

fn validate(request: &TriggerRequest) -> ApiResult<()> {
    for (field, value) in [
        ("user_id", &request.user_id),
        ("teacher_id", &request.teacher_id),
        ("class_id", &request.class_id),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::BadRequest(format!("{field} must not be empty")));
        }
    }
    if !DATE_FORMAT.is_match(&request.date) {
        return Err(ApiError::BadRequest(format!(
            "date must be YYYY-MM-DD, got '{}'",
            request.date
        )));
    }
    validate_clock("start_time", &request.start_time)?;
    validate_clock("end_time", &request.end_time)?;
    Ok(())
}

/// POST /v1/trigger
pub async fn trigger(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TriggerRequest>,
) -> ApiResult<Response> {
    // Replay window for repeated mutating calls
    let idempotency_header = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let Some(key) = &idempotency_header {
        if let Some((status, body)) = state.idempotency.get(key) {
            info!(idempotency_key = %key, "Replaying cached trigger response");
            return Ok((status, Json(body)).into_response());
        }
    }

    validate(&request)?;

    let outcome = state
        .analytical
        .insert_summary(NewTranscriptArtifact {
            user_id: request.user_id.clone(),
            teacher_id: request.teacher_id.clone(),
            class_id: request.class_id.clone(),
            teacher_email: request.teacher_email.clone(),
            meeting_date: request.date.clone(),
            start_time: request.start_time.clone(),
            end_time: Some(request.end_time.clone()),
        })
        .await?;

    let artifact = match &outcome {
        InsertOutcome::Created(artifact) => {
            info!(
                summary_id = artifact.summary_id,
                class_id = %artifact.class_id,
                "Created transcript artifact"
            );
            artifact
        }
        InsertOutcome::Exists(artifact) => {
            // Same business key: tolerated unless the payload disagrees on
            // who taught the lesson.
            let incompatible = matches!(
                (&artifact.teacher_email, &request.teacher_email),
                (Some(existing), Some(incoming)) if existing != incoming
            );
            if incompatible {
                return Err(ApiError::Conflict(format!(
                    "artifact {} exists for this lesson with a different teacher_email",
                    artifact.summary_id
                )));
            }
            info!(
                summary_id = artifact.summary_id,
                class_id = %artifact.class_id,
                "Trigger repeated for existing artifact"
            );
            artifact
        }
    };

    // Forward to the external workflow. Failures are logged, not surfaced:
    // the artifact exists and the class monitor's cadence (or a repeated
    // trigger) re-attempts the dispatch.
    let payload = WebhookPayload {
        user_id: request.user_id,
        teacher_id: request.teacher_id,
        class_id: request.class_id.clone(),
        date: request.date.clone(),
        start_time: request.start_time,
        end_time: request.end_time,
        teacher_email: request.teacher_email,
    };
    let dispatch = state
        .dispatcher
        .dispatch(&payload, &request.class_id)
        .await;
    if !dispatch.is_success() {
        warn!(
            summary_id = artifact.summary_id,
            outcome = ?dispatch,
            "Workflow dispatch from trigger did not succeed"
        );
    }

    let response = TriggerResponse {
        summary_id: artifact.summary_id,
        status: artifact.status.as_str().to_string(),
        class_id: artifact.class_id.clone(),
        date: artifact.meeting_date.clone(),
        poll_urls: PollUrls {
            status: format!("/v1/lesson-status/{}", artifact.summary_id),
            exercises: format!(
                "/v1/exercises?class_id={}&user_id={}",
                artifact.class_id, artifact.user_id
            ),
        },
    };

    let body = serde_json::to_value(&response)
        .map_err(|e| ApiError::Internal(format!("response serialization failed: {e}")))?;
    if let Some(key) = &idempotency_header {
        state.idempotency.put(key, StatusCode::CREATED, body.clone());
    }
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/trigger", post(trigger))
}

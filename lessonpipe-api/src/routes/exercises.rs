//! GET /v1/exercises

use axum::extract::{Query, State};
use axum::{routing::get, Json, Router};
use lessonpipe_common::models::ExerciseSet;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExercisesQuery {
    pub class_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExercisesResponse {
    pub count: usize,
    pub exercises: Vec<ExerciseSet>,
}

/// GET /v1/exercises?class_id=&user_id=
///
/// Sets are returned newest first; the user filter is optional.
pub async fn list_exercises(
    State(state): State<AppState>,
    Query(query): Query<ExercisesQuery>,
) -> ApiResult<Json<ExercisesResponse>> {
    let class_id = query
        .class_id
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("class_id is required".to_string()))?;

    let exercises = state
        .analytical
        .list_exercise_sets(class_id, query.user_id.as_deref())
        .await?;

    Ok(Json(ExercisesResponse {
        count: exercises.len(),
        exercises,
    }))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/exercises", get(list_exercises))
}

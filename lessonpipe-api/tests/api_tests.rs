//! Integration tests for the lessonpipe-api endpoints
//!
//! Drives the router directly with `tower::ServiceExt::oneshot` against
//! the in-memory analytical store and a scripted dispatcher.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use lessonpipe_api::{build_router, AppState};
use lessonpipe_common::dispatch::{DispatchOutcome, Dispatcher, WebhookPayload};
use lessonpipe_common::models::{NewTranscriptArtifact, SummaryStatus};
use lessonpipe_common::stores::{AnalyticalStore, MemoryAnalyticalStore};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::util::ServiceExt; // for `oneshot`

/// Dispatcher that records calls and always succeeds
#[derive(Default)]
struct RecordingDispatcher {
    calls: Mutex<Vec<WebhookPayload>>,
}

impl RecordingDispatcher {
    fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, payload: &WebhookPayload, _key: &str) -> DispatchOutcome {
        self.calls.lock().unwrap().push(payload.clone());
        DispatchOutcome::Success
    }
}

fn setup() -> (axum::Router, MemoryAnalyticalStore, Arc<RecordingDispatcher>) {
    let store = MemoryAnalyticalStore::new();
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let state = AppState::new(
        Arc::new(store.clone()),
        dispatcher.clone(),
        Duration::from_secs(600),
    );
    (build_router(state), store, dispatcher)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

fn trigger_body() -> Value {
    json!({
        "user_id": "s-1",
        "teacher_id": "t-1",
        "class_id": "c-1",
        "date": "2025-11-24",
        "start_time": "17:00",
        "end_time": "17:30",
        "teacher_email": "teacher@example.com",
    })
}

// =============================================================================
// Health endpoints
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _, _) = setup();
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_ready_endpoint_probes_store() {
    let (app, _, _) = setup();
    let response = app.oneshot(get("/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// POST /v1/trigger
// =============================================================================

#[tokio::test]
async fn test_trigger_creates_artifact_and_dispatches() {
    let (app, store, dispatcher) = setup();

    let response = app
        .oneshot(post_json("/v1/trigger", &trigger_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = extract_json(response.into_body()).await;
    let summary_id = body["summary_id"].as_i64().unwrap();
    assert_eq!(body["status"], "pending");
    assert_eq!(body["class_id"], "c-1");
    assert_eq!(
        body["poll_urls"]["status"],
        format!("/v1/lesson-status/{summary_id}")
    );

    let artifact = store.summary(summary_id).await.unwrap();
    assert_eq!(artifact.status, SummaryStatus::Pending);
    assert_eq!(dispatcher.count(), 1);
}

#[tokio::test]
async fn test_trigger_is_idempotent_on_business_key() {
    let (app, store, dispatcher) = setup();

    let mut bodies = Vec::new();
    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(post_json("/v1/trigger", &trigger_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        bodies.push(extract_json(response.into_body()).await);
    }

    // One artifact, N dispatches, equal responses.
    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[1], bodies[2]);
    assert_eq!(dispatcher.count(), 3);

    let summary_id = bodies[0]["summary_id"].as_i64().unwrap();
    assert!(store.summary(summary_id).await.is_some());
    assert!(store.summary(summary_id + 1).await.is_none());
}

#[tokio::test]
async fn test_trigger_conflicts_on_different_teacher_email() {
    let (app, _, _) = setup();

    let response = app
        .clone()
        .oneshot(post_json("/v1/trigger", &trigger_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let mut body = trigger_body();
    body["teacher_email"] = json!("impostor@example.com");
    let response = app.oneshot(post_json("/v1/trigger", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_trigger_validation_failures() {
    let (app, _, dispatcher) = setup();

    for (field, value) in [
        ("date", "24-11-2025"),
        ("start_time", "5pm"),
        ("end_time", "25:00"),
        ("class_id", ""),
    ] {
        let mut body = trigger_body();
        body[field] = json!(value);
        let response = app
            .clone()
            .oneshot(post_json("/v1/trigger", &body))
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "{field}={value} should be rejected"
        );
    }
    assert_eq!(dispatcher.count(), 0);
}

#[tokio::test]
async fn test_trigger_replays_idempotency_key_without_side_effects() {
    let (app, _, dispatcher) = setup();

    let request = |key: &str| {
        Request::builder()
            .method("POST")
            .uri("/v1/trigger")
            .header("Content-Type", "application/json")
            .header("Idempotency-Key", key)
            .body(Body::from(trigger_body().to_string()))
            .unwrap()
    };

    let first = app.clone().oneshot(request("idem-1")).await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_body = extract_json(first.into_body()).await;

    let second = app.oneshot(request("idem-1")).await.unwrap();
    assert_eq!(second.status(), StatusCode::CREATED);
    let second_body = extract_json(second.into_body()).await;

    assert_eq!(first_body, second_body);
    // The replay never reached the dispatcher.
    assert_eq!(dispatcher.count(), 1);
}

// =============================================================================
// GET /v1/lesson-status/{summary_id}
// =============================================================================

#[tokio::test]
async fn test_lesson_status_unknown_returns_404() {
    let (app, _, _) = setup();
    let response = app.oneshot(get("/v1/lesson-status/999")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_lesson_status_reflects_row_state() {
    let (app, store, _) = setup();
    let artifact = store
        .seed_summary(
            NewTranscriptArtifact {
                user_id: "s-1".to_string(),
                teacher_id: "t-1".to_string(),
                class_id: "c-1".to_string(),
                teacher_email: None,
                meeting_date: "2025-11-24".to_string(),
                start_time: "17:00".to_string(),
                end_time: None,
            },
            Some("a transcript long enough to matter".to_string()),
            SummaryStatus::AwaitingExercises,
        )
        .await;

    let response = app
        .oneshot(get(&format!("/v1/lesson-status/{}", artifact.summary_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "awaiting_exercises");
    assert_eq!(body["exercises_generated"], false);
    assert_eq!(body["transcript_available"], true);
    assert_eq!(body["processing_attempts"], 0);
    assert!(body.get("processed_at").is_none());
}

// =============================================================================
// GET /v1/exercises
// =============================================================================

#[tokio::test]
async fn test_exercises_requires_class_id() {
    let (app, _, _) = setup();
    let response = app.oneshot(get("/v1/exercises")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_exercises_empty_for_unknown_class() {
    let (app, _, _) = setup();
    let response = app
        .oneshot(get("/v1/exercises?class_id=c-404"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["count"], 0);
    assert_eq!(body["exercises"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_exercises_returns_completed_sets() {
    let (app, store, _) = setup();
    let artifact = store
        .seed_summary(
            NewTranscriptArtifact {
                user_id: "s-1".to_string(),
                teacher_id: "t-1".to_string(),
                class_id: "c-1".to_string(),
                teacher_email: None,
                meeting_date: "2025-11-24".to_string(),
                start_time: "17:00".to_string(),
                end_time: None,
            },
            Some("transcript ".repeat(20)),
            SummaryStatus::AwaitingExercises,
        )
        .await;

    // Complete through the store the way the worker does.
    let claimed = store.try_claim(&artifact).await.unwrap().unwrap();
    let engine = sample_document();
    store
        .complete_with_exercises(claimed.summary_id, engine)
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get("/v1/exercises?class_id=c-1"))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["exercises"][0]["summary_id"], artifact.summary_id);
    assert_eq!(body["exercises"][0]["status"], "pending_approval");

    // The user filter narrows the result.
    let response = app
        .oneshot(get("/v1/exercises?class_id=c-1&user_id=nobody"))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["count"], 0);
}

/// Minimal but structurally valid exercise document
fn sample_document() -> lessonpipe_common::models::ExerciseDocument {
    use lessonpipe_common::models::*;
    ExerciseDocument {
        flashcards: vec![Flashcard {
            word: "breakfast".to_string(),
            translation: None,
            example_sentence: "I eat breakfast at eight.".to_string(),
            category: None,
            difficulty: Difficulty::Beginner,
        }],
        cloze: vec![],
        grammar: vec![],
        sentence: vec![],
        counts: ExerciseCounts {
            flashcards: 1,
            cloze: 0,
            grammar: 0,
            sentence: 0,
        },
        metadata: ExerciseMetadata {
            quality_passed: false,
            quality_score: 25,
            vocabulary_count: 1,
            sentences_count: 1,
            translation_present: false,
            sources: ExerciseSources {
                flashcards: ExerciseSource::Heuristic,
                cloze: ExerciseSource::Heuristic,
                grammar: ExerciseSource::Heuristic,
                sentence: ExerciseSource::Heuristic,
            },
        },
    }
}

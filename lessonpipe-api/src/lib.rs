//! lessonpipe-api - Trigger and read HTTP surface
//!
//! Couples the pipeline to the rest of the platform:
//! - `POST /v1/trigger` - idempotent artifact creation + workflow dispatch
//! - `GET /v1/lesson-status/{summary_id}` - lifecycle read-back
//! - `GET /v1/exercises` - generated exercise sets for a class
//! - `GET /health`, `GET /ready` - liveness and store connectivity
//!
//! Authentication is an upstream concern; this surface trusts its callers.

pub mod error;
pub mod idempotency;
pub mod routes;

use axum::Router;
use idempotency::IdempotencyCache;
use lessonpipe_common::dispatch::Dispatcher;
use lessonpipe_common::stores::AnalyticalStore;
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub analytical: Arc<dyn AnalyticalStore>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub idempotency: IdempotencyCache,
}

impl AppState {
    pub fn new(
        analytical: Arc<dyn AnalyticalStore>,
        dispatcher: Arc<dyn Dispatcher>,
        idempotency_window: Duration,
    ) -> Self {
        Self {
            analytical,
            dispatcher,
            idempotency: IdempotencyCache::new(idempotency_window),
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::trigger::routes())
        .merge(routes::status::routes())
        .merge(routes::exercises::routes())
        .merge(routes::health::routes())
        .with_state(state)
}

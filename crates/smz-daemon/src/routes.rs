//! Daemon router.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::auth::{request_logging, require_bearer};
use crate::handlers::{
    get_events, get_slide_image, get_slides_snapshot, get_status, healthz, post_summarize,
};
use crate::state::AppState;

/// Build the daemon router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/status", get(get_status))
        .route("/v1/summarize", post(post_summarize))
        .route("/v1/summarize/:id/events", get(get_events))
        .route("/v1/slides/:run_id/snapshot", get(get_slides_snapshot))
        .route("/v1/slides/:source_id/:index", get(get_slide_image))
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer))
        .layer(middleware::from_fn(request_logging))
        .with_state(state)
}

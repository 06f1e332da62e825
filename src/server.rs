//! Application state and router assembly.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;

use crate::clock::Clock;
use crate::handlers;
use crate::store::Store;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub clock: Arc<dyn Clock>,
}

/// Build the REST control plane.
pub fn build_app(state: AppState, request_timeout_seconds: u64) -> Router {
    let api_routes = Router::new()
        .route(
            "/targets",
            post(handlers::targets::create_target).get(handlers::targets::list_targets),
        )
        .route(
            "/targets/{target_id}",
            get(handlers::targets::get_target)
                .put(handlers::targets::update_target)
                .delete(handlers::targets::delete_target),
        )
        .route(
            "/schedules",
            post(handlers::schedules::create_schedule).get(handlers::schedules::list_schedules),
        )
        .route(
            "/schedules/{schedule_id}",
            get(handlers::schedules::get_schedule).delete(handlers::schedules::delete_schedule),
        )
        .route(
            "/schedules/{schedule_id}/pause",
            post(handlers::schedules::pause_schedule),
        )
        .route(
            "/schedules/{schedule_id}/resume",
            post(handlers::schedules::resume_schedule),
        )
        .route("/runs", get(handlers::runs::list_runs))
        .route("/runs/{run_id}", get(handlers::runs::get_run))
        .route("/metrics", get(handlers::metrics::get_metrics))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(handlers::health::health))
        .merge(api_routes)
}

//! Aggregate metrics handler.

use axum::extract::State;
use axum::Json;

use crate::server::AppState;
use crate::store::MetricsSnapshot;

use super::problem::ApiResult;

/// GET /metrics
pub async fn get_metrics(State(state): State<AppState>) -> ApiResult<Json<MetricsSnapshot>> {
    let snapshot = state.store.aggregate_metrics().await?;
    Ok(Json(snapshot))
}

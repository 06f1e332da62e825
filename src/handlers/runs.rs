//! Run history handlers.

use axum::extract::{Path, Query, State};
use axum::Json;

use crate::api::{AttemptResponse, ListRunsQuery, RunDetailResponse, RunResponse};
use crate::server::AppState;
use crate::store::RunFilter;

use super::problem::{ApiError, ApiResult};

/// GET /runs
pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> ApiResult<Json<Vec<RunResponse>>> {
    let limit = query.limit.unwrap_or(100);
    if !(1..=1000).contains(&limit) {
        return Err(ApiError::Validation(
            "limit must be between 1 and 1000".to_string(),
        ));
    }
    let offset = query.offset.unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::Validation("offset must not be negative".to_string()));
    }

    let runs = state
        .store
        .list_runs(&RunFilter {
            schedule_id: query.schedule_id,
            status: query.status,
            start_time: query.start_time,
            end_time: query.end_time,
            limit,
            offset,
        })
        .await?;

    Ok(Json(runs.into_iter().map(RunResponse::from).collect()))
}

/// GET /runs/{run_id}
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<RunDetailResponse>> {
    let (run, attempts) = state
        .store
        .get_run_with_attempts(&run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Run not found".to_string()))?;

    Ok(Json(RunDetailResponse {
        run: RunResponse::from(run),
        attempts: attempts.into_iter().map(AttemptResponse::from).collect(),
    }))
}

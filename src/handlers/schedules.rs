//! Schedule lifecycle handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::api::{CreateScheduleRequest, ScheduleResponse};
use crate::server::AppState;
use crate::store::{NewSchedule, ScheduleType, StoreError};

use super::problem::{ApiError, ApiResult};

/// POST /schedules
pub async fn create_schedule(
    State(state): State<AppState>,
    payload: Result<Json<CreateScheduleRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    validate(&req)?;

    state
        .store
        .get_target(&req.target_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Target not found".to_string()))?;

    let schedule = state
        .store
        .create_schedule(
            NewSchedule {
                target_id: req.target_id,
                schedule_type: req.schedule_type,
                interval_seconds: req.interval_seconds,
                duration_seconds: req.duration_seconds,
                max_retries: req.max_retries,
                request_timeout_seconds: req.request_timeout_seconds,
            },
            state.clock.now(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ScheduleResponse::from(schedule))))
}

/// GET /schedules
pub async fn list_schedules(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ScheduleResponse>>> {
    let schedules = state.store.list_schedules().await?;
    Ok(Json(
        schedules.into_iter().map(ScheduleResponse::from).collect(),
    ))
}

/// GET /schedules/{schedule_id}
pub async fn get_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<String>,
) -> ApiResult<Json<ScheduleResponse>> {
    let schedule = state
        .store
        .get_schedule(&schedule_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Schedule not found".to_string()))?;
    Ok(Json(ScheduleResponse::from(schedule)))
}

/// POST /schedules/{schedule_id}/pause
///
/// Takes effect on the next tick: a run already in flight completes and is
/// recorded.
pub async fn pause_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<String>,
) -> ApiResult<Json<ScheduleResponse>> {
    let schedule = state
        .store
        .pause_schedule(&schedule_id, state.clock.now())
        .await
        .map_err(|e| transition_error(e, "Only active schedules can be paused"))?;
    Ok(Json(ScheduleResponse::from(schedule)))
}

/// POST /schedules/{schedule_id}/resume
///
/// Reuses the original `started_at`/`expires_at`: paused time counts against
/// a window schedule's deadline.
pub async fn resume_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<String>,
) -> ApiResult<Json<ScheduleResponse>> {
    let schedule = state
        .store
        .resume_schedule(&schedule_id, state.clock.now())
        .await
        .map_err(|e| transition_error(e, "Only paused schedules can be resumed"))?;
    Ok(Json(ScheduleResponse::from(schedule)))
}

/// DELETE /schedules/{schedule_id}
pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.delete_schedule(&schedule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn validate(req: &CreateScheduleRequest) -> ApiResult<()> {
    if req.interval_seconds < 1 {
        return Err(ApiError::Validation(
            "interval_seconds must be at least 1".to_string(),
        ));
    }
    if req.request_timeout_seconds < 1 {
        return Err(ApiError::Validation(
            "request_timeout_seconds must be at least 1".to_string(),
        ));
    }
    if req.max_retries < 0 {
        return Err(ApiError::Validation(
            "max_retries must not be negative".to_string(),
        ));
    }
    match (req.schedule_type, req.duration_seconds) {
        (ScheduleType::Window, None) => Err(ApiError::Validation(
            "duration_seconds is required for window schedules".to_string(),
        )),
        (ScheduleType::Window, Some(duration)) if duration < 1 => Err(ApiError::Validation(
            "duration_seconds must be at least 1".to_string(),
        )),
        _ => Ok(()),
    }
}

fn transition_error(error: StoreError, message: &str) -> ApiError {
    match error {
        StoreError::InvalidTransition(_) => ApiError::Validation(message.to_string()),
        other => other.into(),
    }
}

//! Wire types for the REST control plane.
//!
//! Shared by the handlers and the integration tests so the contract cannot
//! drift silently.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::store::{Attempt, Run, RunStatus, Schedule, ScheduleType, Target};

/// Methods a target may use.
pub const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

// ============================================================================
// Targets
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateTargetRequest {
    pub name: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body_template: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTargetRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body_template: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct TargetResponse {
    pub id: String,
    pub name: String,
    pub url: String,
    pub method: String,
    pub headers: Option<HashMap<String, String>>,
    pub body_template: Option<serde_json::Value>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<Target> for TargetResponse {
    fn from(target: Target) -> Self {
        Self {
            id: target.id,
            name: target.name,
            url: target.url,
            method: target.method,
            headers: target.headers.map(|h| h.0),
            body_template: target.body_template.map(|b| b.0),
            created_at: target.created_at,
            updated_at: target.updated_at,
        }
    }
}

// ============================================================================
// Schedules
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub target_id: String,
    pub schedule_type: ScheduleType,
    pub interval_seconds: i64,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub max_retries: i64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub id: String,
    pub target_id: String,
    pub schedule_type: ScheduleType,
    pub interval_seconds: i64,
    pub duration_seconds: Option<i64>,
    pub status: crate::store::ScheduleStatus,
    pub started_at: NaiveDateTime,
    pub expires_at: Option<NaiveDateTime>,
    pub last_run_at: Option<NaiveDateTime>,
    pub max_retries: i64,
    pub request_timeout_seconds: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<Schedule> for ScheduleResponse {
    fn from(schedule: Schedule) -> Self {
        Self {
            id: schedule.id,
            target_id: schedule.target_id,
            schedule_type: schedule.schedule_type,
            interval_seconds: schedule.interval_seconds,
            duration_seconds: schedule.duration_seconds,
            status: schedule.status,
            started_at: schedule.started_at,
            expires_at: schedule.expires_at,
            last_run_at: schedule.last_run_at,
            max_retries: schedule.max_retries,
            request_timeout_seconds: schedule.request_timeout_seconds,
            created_at: schedule.created_at,
            updated_at: schedule.updated_at,
        }
    }
}

// ============================================================================
// Runs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default)]
    pub schedule_id: Option<String>,
    #[serde(default)]
    pub status: Option<RunStatus>,
    #[serde(default)]
    pub start_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub end_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub id: String,
    pub schedule_id: String,
    pub status: RunStatus,
    pub started_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl From<Run> for RunResponse {
    fn from(run: Run) -> Self {
        Self {
            id: run.id,
            schedule_id: run.schedule_id,
            status: run.status,
            started_at: run.started_at,
            completed_at: run.completed_at,
            created_at: run.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AttemptResponse {
    pub id: String,
    pub run_id: String,
    pub attempt_number: i64,
    pub status_code: Option<i64>,
    pub latency_ms: Option<f64>,
    pub response_size_bytes: Option<i64>,
    pub error_type: Option<crate::store::ErrorType>,
    pub error_message: Option<String>,
    pub started_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl From<Attempt> for AttemptResponse {
    fn from(attempt: Attempt) -> Self {
        Self {
            id: attempt.id,
            run_id: attempt.run_id,
            attempt_number: attempt.attempt_number,
            status_code: attempt.status_code,
            latency_ms: attempt.latency_ms,
            response_size_bytes: attempt.response_size_bytes,
            error_type: attempt.error_type,
            error_message: attempt.error_message,
            started_at: attempt.started_at,
            completed_at: attempt.completed_at,
            created_at: attempt.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunDetailResponse {
    #[serde(flatten)]
    pub run: RunResponse,
    pub attempts: Vec<AttemptResponse>,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

// ============================================================================
// Serde Defaults
// ============================================================================

fn default_method() -> String {
    "GET".to_string()
}

fn default_request_timeout() -> i64 {
    30
}

//! Persistent row types and status enums.
//!
//! All timestamps are naive UTC with microsecond precision; they are only
//! ever produced through [`crate::clock::Clock`] so comparisons stay
//! consistent across the engine and the database.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

// ============================================================================
// Status Enums
// ============================================================================

/// How a schedule recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ScheduleType {
    /// Fires every `interval_seconds` until paused or deleted.
    Interval,
    /// Fires every `interval_seconds` until `expires_at`, then completes.
    Window,
}

/// Schedule lifecycle status.
///
/// Transitions: `active <-> paused`, and either -> `completed` (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Paused,
    Completed,
}

/// Run lifecycle status. A run is `pending` iff `completed_at` is null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Success,
    Failed,
}

/// Classification of a failed attempt. Absent iff the response code was
/// in `[200, 400)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ErrorType {
    Timeout,
    Dns,
    Connection,
    #[serde(rename = "http_4xx")]
    #[sqlx(rename = "http_4xx")]
    Http4xx,
    #[serde(rename = "http_5xx")]
    #[sqlx(rename = "http_5xx")]
    Http5xx,
    Unknown,
}

// ============================================================================
// Rows
// ============================================================================

/// An external HTTP endpoint that schedules fire against.
#[derive(Debug, Clone, FromRow)]
pub struct Target {
    pub id: String,
    pub name: String,
    pub url: String,
    pub method: String,
    pub headers: Option<Json<HashMap<String, String>>>,
    pub body_template: Option<Json<serde_json::Value>>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A recurring dispatch rule over a target.
#[derive(Debug, Clone, FromRow)]
pub struct Schedule {
    pub id: String,
    pub target_id: String,
    pub schedule_type: ScheduleType,
    pub interval_seconds: i64,
    pub duration_seconds: Option<i64>,
    pub status: ScheduleStatus,
    pub started_at: NaiveDateTime,
    pub expires_at: Option<NaiveDateTime>,
    pub last_run_at: Option<NaiveDateTime>,
    pub max_retries: i64,
    pub request_timeout_seconds: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// One scheduled trigger, containing one or more attempts.
#[derive(Debug, Clone, FromRow)]
pub struct Run {
    pub id: String,
    pub schedule_id: String,
    pub status: RunStatus,
    pub started_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// One outbound HTTP request (initial or retry) with its measured outcome.
#[derive(Debug, Clone, FromRow)]
pub struct Attempt {
    pub id: String,
    pub run_id: String,
    pub attempt_number: i64,
    pub status_code: Option<i64>,
    pub latency_ms: Option<f64>,
    pub response_size_bytes: Option<i64>,
    pub error_type: Option<ErrorType>,
    pub error_message: Option<String>,
    pub started_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

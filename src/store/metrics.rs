//! Aggregate metrics across schedules, runs, and attempts.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::error::Result;
use super::Store;

/// Per-schedule run statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleMetrics {
    pub schedule_id: String,
    pub total_runs: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub avg_latency_ms: Option<f64>,
    pub last_run_at: Option<NaiveDateTime>,
}

/// Full metrics snapshot returned by `GET /metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_schedules: i64,
    pub active_schedules: i64,
    pub paused_schedules: i64,
    pub total_runs: i64,
    pub total_success: i64,
    pub total_failures: i64,
    pub avg_latency_ms: Option<f64>,
    pub schedules: Vec<ScheduleMetrics>,
}

impl Store {
    /// Build the full metrics snapshot.
    pub async fn aggregate_metrics(&self) -> Result<MetricsSnapshot> {
        let (total_schedules, active_schedules, paused_schedules): (i64, i64, i64) =
            sqlx::query_as(
                "SELECT COUNT(*), \
                 COALESCE(SUM(status = 'active'), 0), \
                 COALESCE(SUM(status = 'paused'), 0) FROM schedules",
            )
            .fetch_one(self.pool())
            .await?;

        let (total_runs, total_success, total_failures): (i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), \
             COALESCE(SUM(status = 'success'), 0), \
             COALESCE(SUM(status = 'failed'), 0) FROM runs",
        )
        .fetch_one(self.pool())
        .await?;

        let avg_latency_ms: Option<f64> =
            sqlx::query_scalar("SELECT AVG(latency_ms) FROM attempts")
                .fetch_one(self.pool())
                .await?;

        let latency_by_schedule: HashMap<String, f64> = sqlx::query_as::<_, (String, f64)>(
            "SELECT r.schedule_id, AVG(a.latency_ms) FROM attempts a \
             JOIN runs r ON a.run_id = r.id GROUP BY r.schedule_id",
        )
        .fetch_all(self.pool())
        .await?
        .into_iter()
        .collect();

        let rows: Vec<(String, Option<NaiveDateTime>, i64, i64)> = sqlx::query_as(
            "SELECT s.id, s.last_run_at, COUNT(r.id), \
             COALESCE(SUM(r.status = 'success'), 0) \
             FROM schedules s LEFT JOIN runs r ON r.schedule_id = s.id \
             GROUP BY s.id ORDER BY s.created_at DESC, s.id",
        )
        .fetch_all(self.pool())
        .await?;

        let schedules = rows
            .into_iter()
            .map(|(schedule_id, last_run_at, total_runs, success_count)| ScheduleMetrics {
                avg_latency_ms: latency_by_schedule.get(&schedule_id).copied().map(round2),
                failure_count: total_runs - success_count,
                schedule_id,
                total_runs,
                success_count,
                last_run_at,
            })
            .collect();

        Ok(MetricsSnapshot {
            total_schedules,
            active_schedules,
            paused_schedules,
            total_runs,
            total_success,
            total_failures,
            avg_latency_ms: avg_latency_ms.map(round2),
            schedules,
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

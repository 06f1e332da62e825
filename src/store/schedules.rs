//! Schedule repository and lifecycle transitions.
//!
//! Status transitions run inside a transaction with the precondition checked
//! against the row being mutated, so a concurrent pause/resume cannot slip
//! through an `active -> paused -> completed` race.

use chrono::{Duration, NaiveDateTime};
use uuid::Uuid;

use super::error::{Result, StoreError};
use super::models::{Schedule, ScheduleStatus, ScheduleType};
use super::Store;

/// Fields for creating a schedule, already validated at the API boundary.
#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub target_id: String,
    pub schedule_type: ScheduleType,
    pub interval_seconds: i64,
    pub duration_seconds: Option<i64>,
    pub max_retries: i64,
    pub request_timeout_seconds: i64,
}

impl Store {
    /// Insert a new active schedule; window schedules get their expiry
    /// derived from `now + duration_seconds`.
    pub async fn create_schedule(&self, input: NewSchedule, now: NaiveDateTime) -> Result<Schedule> {
        let id = Uuid::new_v4().to_string();
        let expires_at = match input.schedule_type {
            ScheduleType::Window => input
                .duration_seconds
                .map(|secs| now + Duration::seconds(secs)),
            ScheduleType::Interval => None,
        };

        sqlx::query(
            "INSERT INTO schedules (id, target_id, schedule_type, interval_seconds, \
             duration_seconds, status, started_at, expires_at, last_run_at, max_retries, \
             request_timeout_seconds, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&input.target_id)
        .bind(input.schedule_type)
        .bind(input.interval_seconds)
        .bind(input.duration_seconds)
        .bind(ScheduleStatus::Active)
        .bind(now)
        .bind(expires_at)
        .bind(input.max_retries)
        .bind(input.request_timeout_seconds)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.require_schedule(&id).await
    }

    /// Fetch a schedule by ID.
    pub async fn get_schedule(&self, id: &str) -> Result<Option<Schedule>> {
        let schedule = sqlx::query_as::<_, Schedule>("SELECT * FROM schedules WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(schedule)
    }

    /// List all schedules, newest first.
    pub async fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let schedules =
            sqlx::query_as::<_, Schedule>("SELECT * FROM schedules ORDER BY created_at DESC, id")
                .fetch_all(self.pool())
                .await?;
        Ok(schedules)
    }

    /// List schedules with `status = active`; the engine calls this once per
    /// tick to get its snapshot.
    pub async fn list_active_schedules(&self) -> Result<Vec<Schedule>> {
        let schedules =
            sqlx::query_as::<_, Schedule>("SELECT * FROM schedules WHERE status = ?")
                .bind(ScheduleStatus::Active)
                .fetch_all(self.pool())
                .await?;
        Ok(schedules)
    }

    /// Pause an active schedule. Fails with an invalid-transition error if it
    /// is not currently active.
    pub async fn pause_schedule(&self, id: &str, now: NaiveDateTime) -> Result<Schedule> {
        self.transition_schedule(id, ScheduleStatus::Active, ScheduleStatus::Paused, now)
            .await
    }

    /// Resume a paused schedule. `started_at` and `expires_at` are reused:
    /// paused time counts against a window's deadline.
    pub async fn resume_schedule(&self, id: &str, now: NaiveDateTime) -> Result<Schedule> {
        self.transition_schedule(id, ScheduleStatus::Paused, ScheduleStatus::Active, now)
            .await
    }

    /// Transition an expired window schedule to `completed`. Idempotent: only
    /// rows still active are touched; returns whether a row changed.
    pub async fn complete_schedule(&self, id: &str, now: NaiveDateTime) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE schedules SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(ScheduleStatus::Completed)
        .bind(now)
        .bind(id)
        .bind(ScheduleStatus::Active)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a schedule; runs and attempts cascade.
    pub async fn delete_schedule(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ScheduleNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn transition_schedule(
        &self,
        id: &str,
        from: ScheduleStatus,
        to: ScheduleStatus,
        now: NaiveDateTime,
    ) -> Result<Schedule> {
        let mut tx = self.pool().begin().await?;

        let current: Option<ScheduleStatus> =
            sqlx::query_scalar("SELECT status FROM schedules WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let current = current.ok_or_else(|| StoreError::ScheduleNotFound(id.to_string()))?;
        if current != from {
            return Err(StoreError::InvalidTransition(format!(
                "schedule {id} is {current:?}, expected {from:?}"
            )));
        }

        sqlx::query("UPDATE schedules SET status = ?, updated_at = ? WHERE id = ?")
            .bind(to)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        self.require_schedule(id).await
    }

    pub(crate) async fn require_schedule(&self, id: &str) -> Result<Schedule> {
        self.get_schedule(id)
            .await?
            .ok_or_else(|| StoreError::ScheduleNotFound(id.to_string()))
    }
}

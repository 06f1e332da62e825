//! Run and attempt repository.

use chrono::NaiveDateTime;
use sqlx::QueryBuilder;
use uuid::Uuid;

use super::error::Result;
use super::models::{Attempt, ErrorType, Run, RunStatus};
use super::Store;

/// Measured outcome of one attempt, ready to persist.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub status_code: Option<i64>,
    pub latency_ms: f64,
    pub response_size_bytes: i64,
    pub error_type: Option<ErrorType>,
    pub error_message: Option<String>,
    pub started_at: NaiveDateTime,
    pub completed_at: NaiveDateTime,
}

/// Filters for listing runs.
#[derive(Debug, Clone)]
pub struct RunFilter {
    pub schedule_id: Option<String>,
    pub status: Option<RunStatus>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for RunFilter {
    fn default() -> Self {
        Self {
            schedule_id: None,
            status: None,
            start_time: None,
            end_time: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl Store {
    /// Open a run: insert it as `pending` and stamp the schedule's
    /// `last_run_at` in the same transaction. Committing `last_run_at` with
    /// the run keeps the schedule from being re-admitted by a tick that lands
    /// after the registry entry is released.
    pub async fn open_run(&self, schedule_id: &str, now: NaiveDateTime) -> Result<Run> {
        let id = Uuid::new_v4().to_string();
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "INSERT INTO runs (id, schedule_id, status, started_at, completed_at, created_at) \
             VALUES (?, ?, ?, ?, NULL, ?)",
        )
        .bind(&id)
        .bind(schedule_id)
        .bind(RunStatus::Pending)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE schedules SET last_run_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(schedule_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let run = sqlx::query_as::<_, Run>("SELECT * FROM runs WHERE id = ?")
            .bind(&id)
            .fetch_one(self.pool())
            .await?;
        Ok(run)
    }

    /// Close a run with its final status. Guarded on `pending` so a terminal
    /// status can never revert.
    pub async fn finalize_run(
        &self,
        run_id: &str,
        status: RunStatus,
        now: NaiveDateTime,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE runs SET status = ?, completed_at = ? WHERE id = ? AND status = ?",
        )
        .bind(status)
        .bind(now)
        .bind(run_id)
        .bind(RunStatus::Pending)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Persist one attempt within a run.
    pub async fn append_attempt(
        &self,
        run_id: &str,
        attempt_number: i64,
        attempt: NewAttempt,
    ) -> Result<Attempt> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO attempts (id, run_id, attempt_number, status_code, latency_ms, \
             response_size_bytes, error_type, error_message, started_at, completed_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(run_id)
        .bind(attempt_number)
        .bind(attempt.status_code)
        .bind(attempt.latency_ms)
        .bind(attempt.response_size_bytes)
        .bind(attempt.error_type)
        .bind(&attempt.error_message)
        .bind(attempt.started_at)
        .bind(attempt.completed_at)
        .bind(attempt.completed_at)
        .execute(self.pool())
        .await?;

        let row = sqlx::query_as::<_, Attempt>("SELECT * FROM attempts WHERE id = ?")
            .bind(&id)
            .fetch_one(self.pool())
            .await?;
        Ok(row)
    }

    /// List runs matching the filter, newest first.
    pub async fn list_runs(&self, filter: &RunFilter) -> Result<Vec<Run>> {
        let mut query = QueryBuilder::new("SELECT * FROM runs WHERE 1 = 1");
        if let Some(schedule_id) = &filter.schedule_id {
            query.push(" AND schedule_id = ").push_bind(schedule_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status);
        }
        if let Some(start) = filter.start_time {
            query.push(" AND started_at >= ").push_bind(start);
        }
        if let Some(end) = filter.end_time {
            query.push(" AND started_at <= ").push_bind(end);
        }
        query
            .push(" ORDER BY created_at DESC, id LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let runs = query.build_query_as::<Run>().fetch_all(self.pool()).await?;
        Ok(runs)
    }

    /// Fetch a run with its attempts in ascending `attempt_number` order.
    pub async fn get_run_with_attempts(&self, run_id: &str) -> Result<Option<(Run, Vec<Attempt>)>> {
        let run = sqlx::query_as::<_, Run>("SELECT * FROM runs WHERE id = ?")
            .bind(run_id)
            .fetch_optional(self.pool())
            .await?;
        let Some(run) = run else {
            return Ok(None);
        };

        let attempts = sqlx::query_as::<_, Attempt>(
            "SELECT * FROM attempts WHERE run_id = ? ORDER BY attempt_number",
        )
        .bind(run_id)
        .fetch_all(self.pool())
        .await?;
        Ok(Some((run, attempts)))
    }

    /// Startup recovery: rewrite every run left `pending` by an unclean
    /// shutdown as failed. Runs that never recorded an attempt get one
    /// synthetic `unknown`/"interrupted" attempt so their failure is
    /// explained; runs that crashed mid-retry keep their recorded attempts.
    /// Returns the number of runs swept.
    pub async fn mark_orphans(&self, now: NaiveDateTime) -> Result<u64> {
        let mut tx = self.pool().begin().await?;

        let bare: Vec<String> = sqlx::query_scalar(
            "SELECT r.id FROM runs r \
             WHERE r.status = ? AND NOT EXISTS (SELECT 1 FROM attempts a WHERE a.run_id = r.id)",
        )
        .bind(RunStatus::Pending)
        .fetch_all(&mut *tx)
        .await?;

        for run_id in &bare {
            sqlx::query(
                "INSERT INTO attempts (id, run_id, attempt_number, status_code, latency_ms, \
                 response_size_bytes, error_type, error_message, started_at, completed_at, created_at) \
                 VALUES (?, ?, 1, NULL, 0.0, 0, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(run_id)
            .bind(ErrorType::Unknown)
            .bind("interrupted")
            .bind(now)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let swept = sqlx::query("UPDATE runs SET status = ?, completed_at = ? WHERE status = ?")
            .bind(RunStatus::Failed)
            .bind(now)
            .bind(RunStatus::Pending)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schedules::NewSchedule;
    use crate::store::targets::NewTarget;
    use crate::store::test_support::memory_store;
    use crate::store::ScheduleType;
    use chrono::{Duration, NaiveDate};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn ok_attempt(started_at: NaiveDateTime) -> NewAttempt {
        NewAttempt {
            status_code: Some(200),
            latency_ms: 12.5,
            response_size_bytes: 64,
            error_type: None,
            error_message: None,
            started_at,
            completed_at: started_at + Duration::milliseconds(13),
        }
    }

    async fn store_with_schedule() -> (Store, String) {
        let store = memory_store().await;
        let target = store
            .create_target(
                NewTarget {
                    name: "t".to_string(),
                    url: "https://example.test/".to_string(),
                    method: "GET".to_string(),
                    headers: None,
                    body_template: None,
                },
                now(),
            )
            .await
            .unwrap();
        let schedule = store
            .create_schedule(
                NewSchedule {
                    target_id: target.id,
                    schedule_type: ScheduleType::Interval,
                    interval_seconds: 60,
                    duration_seconds: None,
                    max_retries: 2,
                    request_timeout_seconds: 30,
                },
                now(),
            )
            .await
            .unwrap();
        (store, schedule.id)
    }

    #[tokio::test]
    async fn open_run_stamps_last_run_at() {
        let (store, schedule_id) = store_with_schedule().await;
        let run = store.open_run(&schedule_id, now()).await.unwrap();

        assert_eq!(run.status, RunStatus::Pending);
        assert!(run.completed_at.is_none());

        let schedule = store.get_schedule(&schedule_id).await.unwrap().unwrap();
        assert_eq!(schedule.last_run_at, Some(now()));
    }

    #[tokio::test]
    async fn finalize_never_reverts_terminal_status() {
        let (store, schedule_id) = store_with_schedule().await;
        let run = store.open_run(&schedule_id, now()).await.unwrap();

        assert!(store
            .finalize_run(&run.id, RunStatus::Success, now())
            .await
            .unwrap());
        assert!(!store
            .finalize_run(&run.id, RunStatus::Failed, now())
            .await
            .unwrap());

        let (fetched, _) = store.get_run_with_attempts(&run.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Success);
        assert!(fetched.completed_at.is_some());
    }

    #[tokio::test]
    async fn attempts_come_back_in_number_order() {
        let (store, schedule_id) = store_with_schedule().await;
        let run = store.open_run(&schedule_id, now()).await.unwrap();

        for n in [2, 1, 3] {
            store
                .append_attempt(&run.id, n, ok_attempt(now() + Duration::seconds(n)))
                .await
                .unwrap();
        }

        let (_, attempts) = store.get_run_with_attempts(&run.id).await.unwrap().unwrap();
        let numbers: Vec<i64> = attempts.iter().map(|a| a.attempt_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn list_runs_filters_by_status_and_window() {
        let (store, schedule_id) = store_with_schedule().await;

        let first = store.open_run(&schedule_id, now()).await.unwrap();
        store
            .finalize_run(&first.id, RunStatus::Success, now())
            .await
            .unwrap();
        let second = store
            .open_run(&schedule_id, now() + Duration::seconds(60))
            .await
            .unwrap();
        store
            .finalize_run(&second.id, RunStatus::Failed, now() + Duration::seconds(61))
            .await
            .unwrap();

        let failed = store
            .list_runs(&RunFilter {
                status: Some(RunStatus::Failed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, second.id);

        let early = store
            .list_runs(&RunFilter {
                end_time: Some(now() + Duration::seconds(30)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(early.len(), 1);
        assert_eq!(early[0].id, first.id);

        let paged = store
            .list_runs(&RunFilter {
                limit: 1,
                offset: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].id, first.id);
    }

    #[tokio::test]
    async fn orphan_sweep_rewrites_pending_runs() {
        let (store, schedule_id) = store_with_schedule().await;
        let run = store.open_run(&schedule_id, now()).await.unwrap();

        let startup = now() + Duration::seconds(300);
        let swept = store.mark_orphans(startup).await.unwrap();
        assert_eq!(swept, 1);

        let (fetched, attempts) = store.get_run_with_attempts(&run.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Failed);
        assert_eq!(fetched.completed_at, Some(startup));
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].attempt_number, 1);
        assert_eq!(attempts[0].error_type, Some(ErrorType::Unknown));
        assert_eq!(attempts[0].error_message.as_deref(), Some("interrupted"));
    }

    #[tokio::test]
    async fn orphan_sweep_twice_equals_once() {
        let (store, schedule_id) = store_with_schedule().await;
        store.open_run(&schedule_id, now()).await.unwrap();

        let startup = now() + Duration::seconds(300);
        assert_eq!(store.mark_orphans(startup).await.unwrap(), 1);
        assert_eq!(
            store
                .mark_orphans(startup + Duration::seconds(1))
                .await
                .unwrap(),
            0
        );

        let runs = store.list_runs(&RunFilter::default()).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].completed_at, Some(startup));
    }

    #[tokio::test]
    async fn orphan_sweep_keeps_existing_attempts() {
        let (store, schedule_id) = store_with_schedule().await;
        let run = store.open_run(&schedule_id, now()).await.unwrap();
        store
            .append_attempt(&run.id, 1, ok_attempt(now()))
            .await
            .unwrap();

        store.mark_orphans(now() + Duration::seconds(10)).await.unwrap();

        let (fetched, attempts) = store.get_run_with_attempts(&run.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Failed);
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status_code, Some(200));
    }

    #[tokio::test]
    async fn deleting_schedule_cascades_to_runs_and_attempts() {
        let (store, schedule_id) = store_with_schedule().await;
        let run = store.open_run(&schedule_id, now()).await.unwrap();
        store
            .append_attempt(&run.id, 1, ok_attempt(now()))
            .await
            .unwrap();

        store.delete_schedule(&schedule_id).await.unwrap();
        assert!(store.get_run_with_attempts(&run.id).await.unwrap().is_none());
    }
}

//! Per-run execution state machine.
//!
//! One task per admitted schedule: open the run (stamping `last_run_at` in
//! the same transaction), perform up to `1 + max_retries` sequential
//! attempts, close the run, and release the registry entry on every exit
//! path.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::clock::Clock;
use crate::dispatch::{Dispatcher, Outcome, RequestSpec};
use crate::store::{ErrorType, NewAttempt, Run, RunStatus, Schedule, Store};

use super::active::ActiveExecutions;

/// Everything a spawned run task needs; cheap clones of shared services.
pub(crate) struct ExecutorContext {
    pub store: Store,
    pub dispatcher: Dispatcher,
    pub clock: Arc<dyn Clock>,
    pub active: ActiveExecutions,
    pub cancel: CancellationToken,
}

/// Entry point for a spawned run task. The registry entry is released when
/// this returns, panics included.
pub(crate) async fn execute_schedule(ctx: ExecutorContext, schedule_id: String) {
    let _guard = ReleaseGuard {
        active: ctx.active.clone(),
        schedule_id: schedule_id.clone(),
    };

    if let Err(e) = run(&ctx, &schedule_id).await {
        error!(schedule_id = %schedule_id, error = %e, "run execution failed");
    }
}

async fn run(ctx: &ExecutorContext, schedule_id: &str) -> crate::store::Result<()> {
    let Some(schedule) = ctx.store.get_schedule(schedule_id).await? else {
        // Deleted between admission and execution; nothing to record.
        debug!(schedule_id = %schedule_id, "schedule vanished before dispatch");
        return Ok(());
    };

    let run = ctx.store.open_run(&schedule.id, ctx.clock.now()).await?;
    debug!(schedule_id = %schedule.id, run_id = %run.id, "run opened");

    match attempt_loop(ctx, &schedule, &run).await {
        Ok(status) => {
            ctx.store
                .finalize_run(&run.id, status, ctx.clock.now())
                .await?;
            debug!(run_id = %run.id, status = ?status, "run finalized");
            Ok(())
        }
        Err(e) => {
            // Best effort: close the run so it does not linger pending. If
            // this also fails, the orphan sweep corrects it on next startup.
            let _ = ctx
                .store
                .finalize_run(&run.id, RunStatus::Failed, ctx.clock.now())
                .await;
            Err(e)
        }
    }
}

async fn attempt_loop(
    ctx: &ExecutorContext,
    schedule: &Schedule,
    run: &Run,
) -> crate::store::Result<RunStatus> {
    let max_attempts = schedule.max_retries + 1;
    let timeout = Duration::from_secs(schedule.request_timeout_seconds.max(1) as u64);

    for number in 1..=max_attempts {
        // Fresh read: the target may have been updated (or deleted) since
        // the previous attempt; the latest snapshot wins.
        let Some(target) = ctx.store.get_target(&schedule.target_id).await? else {
            let now = ctx.clock.now();
            ctx.store
                .append_attempt(&run.id, number, failure_attempt(now, now, "target missing"))
                .await?;
            return Ok(RunStatus::Failed);
        };

        let spec = RequestSpec::from_target(&target);
        let started = ctx.clock.now();
        let outcome = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                let now = ctx.clock.now();
                ctx.store
                    .append_attempt(&run.id, number, failure_attempt(started, now, "canceled"))
                    .await?;
                return Ok(RunStatus::Failed);
            }
            outcome = ctx.dispatcher.dispatch(&spec, timeout, ctx.clock.as_ref()) => outcome,
        };

        let success = outcome.is_success();
        ctx.store
            .append_attempt(&run.id, number, record_outcome(outcome))
            .await?;

        if success {
            return Ok(RunStatus::Success);
        }
        // Retry immediately; there is no backoff between attempts.
    }

    Ok(RunStatus::Failed)
}

fn record_outcome(outcome: Outcome) -> NewAttempt {
    NewAttempt {
        status_code: outcome.status_code,
        latency_ms: outcome.latency_ms,
        response_size_bytes: outcome.response_size_bytes,
        error_type: outcome.error_type,
        error_message: outcome.error_message,
        started_at: outcome.started_at,
        completed_at: outcome.completed_at,
    }
}

fn failure_attempt(
    started_at: chrono::NaiveDateTime,
    completed_at: chrono::NaiveDateTime,
    message: &str,
) -> NewAttempt {
    NewAttempt {
        status_code: None,
        latency_ms: (completed_at - started_at).num_milliseconds() as f64,
        response_size_bytes: 0,
        error_type: Some(ErrorType::Unknown),
        error_message: Some(message.to_string()),
        started_at,
        completed_at,
    }
}

struct ReleaseGuard {
    active: ActiveExecutions,
    schedule_id: String,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.active.release(&self.schedule_id);
    }
}

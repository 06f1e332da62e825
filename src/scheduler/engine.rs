//! Tick loop and engine lifecycle.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::dispatch::Dispatcher;
use crate::store::{Schedule, ScheduleType, Store};

use super::active::ActiveExecutions;
use super::executor::{execute_schedule, ExecutorContext};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Tick period.
    pub poll_interval: Duration,
    /// How long shutdown waits for in-flight runs before aborting them.
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// The scheduler engine.
///
/// Owns the tick loop; spawns one executor task per admitted schedule. The
/// loop never terminates on its own — every tick error is logged and
/// swallowed — only cancellation stops it.
pub struct Engine {
    store: Store,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    active: ActiveExecutions,
    tasks: RunTasks,
    cancel: CancellationToken,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        store: Store,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            active: ActiveExecutions::new(),
            tasks: RunTasks::default(),
            cancel: CancellationToken::new(),
            config,
        }
    }

    /// The admission registry; exposed so tests can observe in-flight state.
    pub fn active(&self) -> &ActiveExecutions {
        &self.active
    }

    /// Rewrite runs left `pending` by an unclean shutdown. Must run before
    /// the first tick so stale in-flight markers never survive a restart.
    pub async fn recover_orphans(&self) -> crate::store::Result<u64> {
        let swept = self.store.mark_orphans(self.clock.now()).await?;
        if swept > 0 {
            info!(swept, "recovered orphaned runs");
        }
        Ok(swept)
    }

    /// One poll iteration: complete expired windows, admit due schedules,
    /// spawn executors.
    pub async fn tick(&self) -> crate::store::Result<()> {
        let now = self.clock.now();
        let schedules = self.store.list_active_schedules().await?;

        for schedule in schedules {
            if is_expired(&schedule, now) {
                if self.store.complete_schedule(&schedule.id, now).await? {
                    info!(schedule_id = %schedule.id, "window schedule completed");
                }
                continue;
            }
            if !is_due(&schedule, now) {
                continue;
            }
            if !self.active.try_admit(&schedule.id) {
                // Previous run still in flight; the next tick re-evaluates.
                continue;
            }

            debug!(schedule_id = %schedule.id, "dispatching run");
            let ctx = ExecutorContext {
                store: self.store.clone(),
                dispatcher: self.dispatcher.clone(),
                clock: self.clock.clone(),
                active: self.active.clone(),
                cancel: self.cancel.child_token(),
            };
            self.tasks.spawn(execute_schedule(ctx, schedule.id));
        }

        Ok(())
    }

    /// Wait for every currently in-flight run executor to finish.
    pub async fn drain(&self) {
        self.tasks.wait_idle().await;
    }

    /// Start the tick loop; returns a handle for shutdown.
    pub fn start(self) -> EngineHandle {
        let cancel = self.cancel.clone();
        let tasks = self.tasks.clone();
        let grace = self.config.shutdown_grace;
        let task = tokio::spawn(self.run_loop());
        EngineHandle {
            cancel,
            task,
            tasks,
            grace,
        }
    }

    async fn run_loop(self) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "scheduler engine started"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "scheduler tick failed");
                    }
                }
            }
        }

        info!("scheduler engine stopped");
    }
}

/// Handle to a started engine.
pub struct EngineHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    tasks: RunTasks,
    grace: Duration,
}

impl EngineHandle {
    /// Stop the tick loop, then wait up to the grace period for in-flight
    /// runs; anything still running after the deadline is aborted.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
        self.tasks.shutdown(self.grace).await;
    }
}

/// `expired(S)`: window schedules past their deadline.
fn is_expired(schedule: &Schedule, now: NaiveDateTime) -> bool {
    schedule.schedule_type == ScheduleType::Window
        && schedule.expires_at.is_some_and(|at| now >= at)
}

/// `due(S)`: never ran, or a full interval has elapsed since the last run
/// started. Missed intervals are not backfilled; at most one run per
/// detection.
fn is_due(schedule: &Schedule, now: NaiveDateTime) -> bool {
    match schedule.last_run_at {
        None => true,
        Some(last) => now >= last + chrono::Duration::seconds(schedule.interval_seconds),
    }
}

// ============================================================================
// RunTasks
// ============================================================================

/// Registry of spawned run-executor handles, awaited on shutdown.
// std::sync::Mutex: the lock is never held across an .await point.
#[derive(Clone, Default)]
struct RunTasks {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl RunTasks {
    fn spawn<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let mut guard = self.handles.lock().expect("mutex poisoned");
        guard.retain(|h| !h.is_finished());
        guard.push(handle);
    }

    /// Await every registered task.
    async fn wait_idle(&self) {
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock().expect("mutex poisoned"));
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "run task panicked");
            }
        }
    }

    /// Await tasks up to a deadline, then abort the stragglers.
    async fn shutdown(&self, grace: Duration) {
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock().expect("mutex poisoned"));
        if handles.is_empty() {
            return;
        }

        info!(count = handles.len(), "waiting for in-flight runs");
        let deadline = tokio::time::Instant::now() + grace;
        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "run task panicked"),
                Err(_) => {
                    warn!("grace period elapsed, aborting run task");
                    handle.abort();
                }
            }
        }
    }
}

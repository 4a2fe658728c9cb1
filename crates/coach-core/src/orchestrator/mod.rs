//! Periodic orchestration of generation, delivery and maintenance.
//!
//! Each task runs on its own repeated job. A tick is skipped when the local
//! hour in the orchestrator timezone is outside the task's window, or when
//! the previous run of the same task is still in progress.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Timelike, Utc};
use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{debug, error, info};

use crate::coaching::CoachingEngine;
use crate::config::{ScheduleConfig, TaskSchedule};
use crate::error::CoachResult;

/// Tasks driven by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum OrchestratedTask {
    Delivery,
    Generation,
    Analytics,
    Cleanup,
    Health,
}

impl OrchestratedTask {
    pub fn schedule<'a>(&self, config: &'a ScheduleConfig) -> &'a TaskSchedule {
        match self {
            Self::Delivery => &config.delivery,
            Self::Generation => &config.generation,
            Self::Analytics => &config.analytics,
            Self::Cleanup => &config.cleanup,
            Self::Health => &config.health,
        }
    }
}

/// What happened on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Completed,
    Failed,
    Disabled,
    OutsideWindow,
    /// The previous run had not finished.
    Busy,
}

/// Runs single ticks with per-task overlap guards.
pub struct TaskRunner {
    engine: Arc<CoachingEngine>,
    schedule: ScheduleConfig,
    guards: HashMap<OrchestratedTask, Mutex<()>>,
}

impl TaskRunner {
    pub fn new(engine: Arc<CoachingEngine>, schedule: ScheduleConfig) -> Self {
        let guards = OrchestratedTask::iter().map(|t| (t, Mutex::new(()))).collect();
        Self {
            engine,
            schedule,
            guards,
        }
    }

    pub fn engine(&self) -> &Arc<CoachingEngine> {
        &self.engine
    }

    /// Run `task` once if its window and guard allow it.
    pub async fn tick(&self, task: OrchestratedTask, now: DateTime<Utc>) -> TickOutcome {
        let schedule = task.schedule(&self.schedule);
        if !schedule.enabled {
            return TickOutcome::Disabled;
        }
        let local_hour = now.with_timezone(&self.schedule.tz()).hour();
        if !schedule.allows_hour(local_hour) {
            debug!(task = %task, local_hour, "Outside active hours, skipping");
            return TickOutcome::OutsideWindow;
        }

        let Some(guard) = self.guards.get(&task) else {
            return TickOutcome::Disabled;
        };
        let Ok(_running) = guard.try_lock() else {
            info!(task = %task, "Previous run still in progress, skipping");
            return TickOutcome::Busy;
        };

        let started = Instant::now();
        let result = self.run(task, now).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(()) => {
                self.engine.stats().record_run(task.into(), now, duration_ms, None);
                TickOutcome::Completed
            }
            Err(e) => {
                error!(task = %task, error = %e, "Orchestrated task failed");
                self.engine
                    .stats()
                    .record_run(task.into(), now, duration_ms, Some(e.to_string()));
                TickOutcome::Failed
            }
        }
    }

    async fn run(&self, task: OrchestratedTask, now: DateTime<Utc>) -> CoachResult<()> {
        match task {
            OrchestratedTask::Delivery => {
                self.engine.deliver_due_at(now).await?;
            }
            OrchestratedTask::Generation => {
                self.engine.generate_sweep_at(now).await?;
            }
            OrchestratedTask::Analytics => {
                self.engine.analytics_rollup_at(now)?;
            }
            OrchestratedTask::Cleanup => {
                self.engine.retention_cleanup_at(now)?;
            }
            OrchestratedTask::Health => {
                self.engine.health_check_at(now)?;
            }
        }
        Ok(())
    }
}

/// Owns the job scheduler for the lifetime of the process.
///
/// # Example
///
/// ```ignore
/// let engine = Arc::new(CoachingEngine::new(config.clone(), store.clone(), store, predictor, notifier));
/// let mut orchestrator = Orchestrator::new(engine, config.schedule).await?;
/// orchestrator.start().await?;
/// // ...
/// orchestrator.shutdown().await?;
/// ```
pub struct Orchestrator {
    scheduler: JobScheduler,
    runner: Arc<TaskRunner>,
}

impl Orchestrator {
    /// Call `start()` to begin periodic execution.
    pub async fn new(engine: Arc<CoachingEngine>, schedule: ScheduleConfig) -> Result<Self, JobSchedulerError> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler,
            runner: Arc::new(TaskRunner::new(engine, schedule)),
        })
    }

    pub fn runner(&self) -> &Arc<TaskRunner> {
        &self.runner
    }

    /// Register one repeated job per enabled task and start the scheduler.
    pub async fn start(&self) -> Result<(), JobSchedulerError> {
        for task in OrchestratedTask::iter() {
            let schedule = *task.schedule(&self.runner.schedule);
            if !schedule.enabled {
                info!(task = %task, "Task disabled");
                continue;
            }
            let runner = self.runner.clone();
            let job = Job::new_repeated_async(
                Duration::from_secs(schedule.interval_minutes.max(1) * 60),
                move |_uuid, _lock| {
                    let runner = runner.clone();
                    Box::pin(async move {
                        let outcome = runner.tick(task, Utc::now()).await;
                        debug!(task = %task, outcome = ?outcome, "Tick finished");
                    })
                },
            )?;
            self.scheduler.add(job).await?;
            info!(
                task = %task,
                interval_minutes = schedule.interval_minutes,
                start_hour = schedule.start_hour,
                end_hour = schedule.end_hour,
                "Scheduled task"
            );
        }

        self.scheduler.start().await?;
        info!(timezone = %self.runner.schedule.timezone, "Orchestrator started");
        Ok(())
    }

    /// Stop the scheduler. Runs already in progress finish on their own.
    pub async fn shutdown(&mut self) -> Result<(), JobSchedulerError> {
        info!("Shutting down orchestrator");
        self.scheduler.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoachConfig;
    use crate::store::SqliteCoachStore;
    use crate::traits::{MockNotifier, MockPredictor};
    use chrono::TimeZone;

    fn runner(schedule: ScheduleConfig) -> TaskRunner {
        let store = Arc::new(SqliteCoachStore::in_memory().unwrap());
        let engine = CoachingEngine::new(
            CoachConfig::default(),
            store.clone(),
            store,
            Arc::new(MockPredictor::new()),
            Arc::new(MockNotifier::new()),
        );
        TaskRunner::new(Arc::new(engine), schedule)
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 6, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_tick_records_run() {
        let runner = runner(ScheduleConfig::default());
        assert_eq!(runner.tick(OrchestratedTask::Health, at(12)).await, TickOutcome::Completed);
        let runs = runner.engine().stats().task_runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].task, "health");
        assert!(runs[0].success);
    }

    #[tokio::test]
    async fn test_delivery_skipped_outside_window() {
        let runner = runner(ScheduleConfig::default());
        assert_eq!(
            runner.tick(OrchestratedTask::Delivery, at(3)).await,
            TickOutcome::OutsideWindow
        );
        assert!(runner.engine().stats().task_runs().is_empty());
    }

    #[tokio::test]
    async fn test_window_uses_orchestrator_timezone() {
        let schedule = ScheduleConfig {
            timezone: "America/New_York".to_string(),
            ..Default::default()
        };
        let runner = runner(schedule);
        // 12:00 UTC is 07:00 in New York, inside the 7-22 generation window.
        assert_eq!(
            runner.tick(OrchestratedTask::Generation, at(12)).await,
            TickOutcome::Completed
        );
        // 05:00 UTC is midnight in New York.
        assert_eq!(
            runner.tick(OrchestratedTask::Generation, at(5)).await,
            TickOutcome::OutsideWindow
        );
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let runner = runner(ScheduleConfig::default());
        let _held = runner.guards[&OrchestratedTask::Cleanup].lock().await;
        assert_eq!(runner.tick(OrchestratedTask::Cleanup, at(12)).await, TickOutcome::Busy);
    }

    #[tokio::test]
    async fn test_disabled_task_never_runs() {
        let mut schedule = ScheduleConfig::default();
        schedule.analytics.enabled = false;
        let runner = runner(schedule);
        assert_eq!(
            runner.tick(OrchestratedTask::Analytics, at(12)).await,
            TickOutcome::Disabled
        );
    }
}

//! Cycle counters and orchestrated task run records.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monotonic counters shared by generation, delivery and maintenance.
#[derive(Debug, Default)]
pub struct EngineStats {
    users_processed: AtomicU64,
    analysis_errors: AtomicU64,
    generation_errors: AtomicU64,
    composition_errors: AtomicU64,
    governor_rejections: AtomicU64,
    drafts_created: AtomicU64,
    messages_sent: AtomicU64,
    delivery_errors: AtomicU64,
    messages_expired: AtomicU64,
    messages_cancelled: AtomicU64,
    interactions: AtomicU64,
    task_runs: Mutex<BTreeMap<String, TaskRun>>,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub users_processed: u64,
    pub analysis_errors: u64,
    pub generation_errors: u64,
    pub composition_errors: u64,
    pub governor_rejections: u64,
    pub drafts_created: u64,
    pub messages_sent: u64,
    pub delivery_errors: u64,
    pub messages_expired: u64,
    pub messages_cancelled: u64,
    pub interactions: u64,
}

/// Last run of one orchestrated task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRun {
    pub task: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub runs: u64,
    pub failures: u64,
}

macro_rules! counter {
    ($inc:ident, $field:ident) => {
        pub fn $inc(&self, n: u64) {
            self.$field.fetch_add(n, Ordering::Relaxed);
        }
    };
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(add_users_processed, users_processed);
    counter!(add_analysis_errors, analysis_errors);
    counter!(add_generation_errors, generation_errors);
    counter!(add_composition_errors, composition_errors);
    counter!(add_governor_rejections, governor_rejections);
    counter!(add_drafts_created, drafts_created);
    counter!(add_messages_sent, messages_sent);
    counter!(add_delivery_errors, delivery_errors);
    counter!(add_messages_expired, messages_expired);
    counter!(add_messages_cancelled, messages_cancelled);
    counter!(add_interactions, interactions);

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            users_processed: load(&self.users_processed),
            analysis_errors: load(&self.analysis_errors),
            generation_errors: load(&self.generation_errors),
            composition_errors: load(&self.composition_errors),
            governor_rejections: load(&self.governor_rejections),
            drafts_created: load(&self.drafts_created),
            messages_sent: load(&self.messages_sent),
            delivery_errors: load(&self.delivery_errors),
            messages_expired: load(&self.messages_expired),
            messages_cancelled: load(&self.messages_cancelled),
            interactions: load(&self.interactions),
        }
    }

    /// Record the outcome of one orchestrated task run.
    pub fn record_run(
        &self,
        task: &str,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        error: Option<String>,
    ) {
        let mut runs = self.task_runs.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = runs.get(task);
        let total = previous.map_or(0, |r| r.runs) + 1;
        let failures = previous.map_or(0, |r| r.failures) + u64::from(error.is_some());
        runs.insert(
            task.to_string(),
            TaskRun {
                task: task.to_string(),
                started_at,
                duration_ms,
                success: error.is_none(),
                error,
                runs: total,
                failures,
            },
        );
    }

    /// Last run of every task that has run at least once.
    pub fn task_runs(&self) -> Vec<TaskRun> {
        self.task_runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

//! Metrics sink for the executor.
//!
//! The executor reports, per root task, how long it waited for a worker and
//! how long it ran. Export is left to the implementation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{TaskState, TaskType};

pub trait TaskMetrics: Send + Sync {
    /// Time between submission and the task getting a worker.
    fn record_wait(&self, task_type: &TaskType, waited: Duration);

    /// Time from first execution to the final persisted state.
    fn record_execution(&self, task_type: &TaskType, state: TaskState, elapsed: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl TaskMetrics for NoopMetrics {
    fn record_wait(&self, _task_type: &TaskType, _waited: Duration) {}

    fn record_execution(&self, _task_type: &TaskType, _state: TaskState, _elapsed: Duration) {}
}

/// Counts by final state, plus summed timings, per task type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskTypeStats {
    pub waits: u64,
    pub total_wait: Duration,
    pub succeeded: u64,
    pub failed: u64,
    pub aborted: u64,
    pub total_execution: Duration,
}

/// Keeps everything in memory. Handy in tests and the CLI summary.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    by_type: Mutex<HashMap<String, TaskTypeStats>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> HashMap<String, TaskTypeStats> {
        self.by_type
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn with_stats(&self, task_type: &TaskType, f: impl FnOnce(&mut TaskTypeStats)) {
        let mut map = self.by_type.lock().unwrap_or_else(|e| e.into_inner());
        f(map.entry(task_type.as_str().to_string()).or_default());
    }
}

impl TaskMetrics for InMemoryMetrics {
    fn record_wait(&self, task_type: &TaskType, waited: Duration) {
        self.with_stats(task_type, |s| {
            s.waits += 1;
            s.total_wait += waited;
        });
    }

    fn record_execution(&self, task_type: &TaskType, state: TaskState, elapsed: Duration) {
        self.with_stats(task_type, |s| {
            match state {
                TaskState::Success => s.succeeded += 1,
                TaskState::Aborted => s.aborted += 1,
                _ => s.failed += 1,
            }
            s.total_execution += elapsed;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_metrics_aggregates_per_type() {
        let m = InMemoryMetrics::new();
        let t = TaskType::new("GFlagsUpgrade");
        m.record_wait(&t, Duration::from_millis(5));
        m.record_execution(&t, TaskState::Success, Duration::from_millis(20));
        m.record_execution(&t, TaskState::Failure, Duration::from_millis(10));

        let snap = m.snapshot();
        let stats = &snap["GFlagsUpgrade"];
        assert_eq!(stats.waits, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total_execution, Duration::from_millis(30));
    }
}

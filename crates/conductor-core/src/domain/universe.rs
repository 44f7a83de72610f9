use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OperationType, TaskId, UniverseId};

/// Per-universe admission record.
///
/// `frozen` means the last placement-modifying task failed and topology can
/// no longer be trusted. It is cleared by the next such task that succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionRecord {
    pub universe_id: UniverseId,
    pub frozen: bool,
    pub blocking_task_id: Option<TaskId>,
    pub blocking_operation: Option<OperationType>,
    /// The blocking operation may be re-run to heal the universe.
    pub retry_eligible: bool,
    pub updated_at: DateTime<Utc>,
}

impl AdmissionRecord {
    pub fn new(universe_id: UniverseId, now: DateTime<Utc>) -> Self {
        Self {
            universe_id,
            frozen: false,
            blocking_task_id: None,
            blocking_operation: None,
            retry_eligible: false,
            updated_at: now,
        }
    }

    pub fn freeze(&mut self, task_id: TaskId, operation: OperationType, now: DateTime<Utc>) {
        self.frozen = true;
        self.blocking_task_id = Some(task_id);
        self.blocking_operation = Some(operation);
        self.retry_eligible = operation.is_rerunnable();
        self.updated_at = now;
    }

    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.frozen = false;
        self.blocking_task_id = None;
        self.blocking_operation = None;
        self.retry_eligible = false;
        self.updated_at = now;
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{OperationType, SubTaskGroupType, TaskId, TaskState, UniverseId};
use crate::error::ConductorError;

/// Free-form kind of a task body, e.g. `"AnsibleConfigureServers"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskType(String);

impl TaskType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<OperationType> for TaskType {
    fn from(op: OperationType) -> Self {
        TaskType::new(op.as_str())
    }
}

/// Position of a root task; subtasks get 0, 1, 2, ... within their parent.
pub const ROOT_POSITION: i32 = -1;

/// Persistent record of one task.
///
/// This is the single source of truth for task state. Roots carry an
/// operation and a universe; subtasks carry a parent, a position and the
/// group they were scheduled in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub task_type: TaskType,
    pub operation: Option<OperationType>,
    pub universe_id: Option<UniverseId>,
    pub parent_id: Option<TaskId>,
    pub position: i32,
    pub state: TaskState,
    pub params: serde_json::Value,
    pub group_type: Option<SubTaskGroupType>,
    pub percent_done: u8,
    /// Process that created the task. Informational: recovery decides by
    /// liveness in the running executor, not by owner.
    pub owner: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskInfo {
    pub fn root(
        id: TaskId,
        operation: OperationType,
        universe_id: UniverseId,
        params: serde_json::Value,
        owner: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            task_type: operation.into(),
            operation: Some(operation),
            universe_id: Some(universe_id),
            parent_id: None,
            position: ROOT_POSITION,
            state: TaskState::Created,
            params,
            group_type: None,
            percent_done: 0,
            owner: owner.into(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn subtask(
        id: TaskId,
        task_type: TaskType,
        parent_id: TaskId,
        position: i32,
        group_type: SubTaskGroupType,
        params: serde_json::Value,
        owner: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            task_type,
            operation: None,
            universe_id: None,
            parent_id: Some(parent_id),
            position,
            state: TaskState::Created,
            params,
            group_type: Some(group_type),
            percent_done: 0,
            owner: owner.into(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Move to `next`, recording `error` when the task ends badly.
    pub fn transition_to(
        &mut self,
        next: TaskState,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ConductorError> {
        if !self.state.can_transition_to(next) {
            return Err(ConductorError::IllegalStateTransition {
                task_id: self.id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        if next == TaskState::Success {
            self.percent_done = 100;
        }
        if error.is_some() {
            self.error = error;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Progress never goes backwards and stops at 100.
    pub fn record_progress(&mut self, percent: u8, now: DateTime<Utc>) {
        let percent = percent.min(100);
        if percent > self.percent_done {
            self.percent_done = percent;
            self.updated_at = now;
        }
    }
}

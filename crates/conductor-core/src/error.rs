use std::time::Duration;

use thiserror::Error;

use crate::domain::{ErrorKind, NodeActionType, NodeState, OperationType, TaskId, TaskState, UniverseId};

#[derive(Debug, Clone, Error)]
pub enum ConductorError {
    #[error(
        "node is in {state} state, but not in one of [{}], so action {action} is not allowed",
        join_states(.allowed_states)
    )]
    InvalidTransition {
        state: NodeState,
        action: NodeActionType,
        allowed_states: Vec<NodeState>,
    },

    #[error("{operation} is not allowed on {universe_id}: frozen by {blocking_operation:?} task {blocking_task_id:?}")]
    AdmissionDenied {
        universe_id: UniverseId,
        operation: OperationType,
        blocking_task_id: Option<TaskId>,
        blocking_operation: Option<OperationType>,
    },

    #[error("subtask {task_id} failed: {message}")]
    SubtaskFailure { task_id: TaskId, message: String },

    #[error("task {task_id} did not stop within {timeout:?} of abort")]
    AbortTimeout { task_id: TaskId, timeout: Duration },

    #[error("executor is shutting down")]
    ExecutorShuttingDown,

    #[error("task {0} was aborted")]
    Cancelled(TaskId),

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("task {0} is not running")]
    TaskNotRunning(TaskId),

    #[error("task {task_id} cannot move from {from} to {to}")]
    IllegalStateTransition {
        task_id: TaskId,
        from: TaskState,
        to: TaskState,
    },

    #[error("store: {0}")]
    Store(String),

    #[error("{0}")]
    Fault(String),
}

fn join_states(states: &[NodeState]) -> String {
    states
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ConductorError {
    pub fn fault(message: impl Into<String>) -> Self {
        ConductorError::Fault(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ConductorError::AdmissionDenied { .. }
            | ConductorError::AbortTimeout { .. }
            | ConductorError::ExecutorShuttingDown => ErrorKind::Transient,
            ConductorError::Store(_) => ErrorKind::Infrastructure,
            ConductorError::InvalidTransition { .. }
            | ConductorError::SubtaskFailure { .. }
            | ConductorError::Cancelled(_)
            | ConductorError::TaskNotFound(_)
            | ConductorError::TaskNotRunning(_)
            | ConductorError::IllegalStateTransition { .. }
            | ConductorError::Fault(_) => ErrorKind::Permanent,
        }
    }

    /// The task this error is about, when there is one.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            ConductorError::SubtaskFailure { task_id, .. }
            | ConductorError::AbortTimeout { task_id, .. }
            | ConductorError::IllegalStateTransition { task_id, .. } => Some(*task_id),
            ConductorError::Cancelled(id)
            | ConductorError::TaskNotFound(id)
            | ConductorError::TaskNotRunning(id) => Some(*id),
            ConductorError::AdmissionDenied {
                blocking_task_id, ..
            } => *blocking_task_id,
            _ => None,
        }
    }
}

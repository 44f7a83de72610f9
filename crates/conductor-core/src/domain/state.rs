//! Task state model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted state of a task or subtask.
///
/// State transitions:
/// - Created -> Initializing -> Running -> Success | Failure
/// - any non-terminal -> Abort -> Aborted (abort requested, then observed)
/// - Unknown -> anything (placeholder for rows whose state was never read)
///
/// Success, Failure and Aborted are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Created,
    Initializing,
    Running,
    Success,
    Failure,
    Unknown,
    Abort,
    Aborted,
}

impl TaskState {
    pub const ALL: [TaskState; 8] = [
        TaskState::Created,
        TaskState::Initializing,
        TaskState::Running,
        TaskState::Success,
        TaskState::Failure,
        TaskState::Unknown,
        TaskState::Abort,
        TaskState::Aborted,
    ];

    /// Roll-up weight. The parent reports the child state with the highest weight.
    pub fn precedence(self) -> u8 {
        match self {
            TaskState::Unknown => 0,
            TaskState::Initializing => 1,
            TaskState::Success => 2,
            TaskState::Created => 3,
            TaskState::Running => 4,
            TaskState::Abort => 5,
            TaskState::Aborted => 6,
            TaskState::Failure => 7,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Failure | TaskState::Aborted
        )
    }

    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            TaskState::Created | TaskState::Initializing | TaskState::Running | TaskState::Abort
        )
    }

    pub fn is_error(self) -> bool {
        matches!(self, TaskState::Failure | TaskState::Aborted)
    }

    /// Whether a persisted task may move from `self` to `next`.
    ///
    /// Terminal states are final. Re-asserting a non-terminal state is a no-op
    /// and allowed.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;

        if self.is_terminal() {
            return false;
        }
        if self == next {
            return true;
        }
        match self {
            Unknown => true,
            Created => matches!(next, Initializing | Running | Failure | Abort | Aborted),
            Initializing => matches!(next, Running | Failure | Abort | Aborted),
            Running => matches!(next, Success | Failure | Abort | Aborted),
            // the body may finish before it notices the abort
            Abort => matches!(next, Aborted | Failure | Success),
            Success | Failure | Aborted => false,
        }
    }

    /// Roll a task's own state up with its children's states.
    ///
    /// The result is the state of highest precedence among `own` and all
    /// `children`, so a single failed leaf surfaces as `Failure` at the root.
    pub fn roll_up<I>(own: TaskState, children: I) -> TaskState
    where
        I: IntoIterator<Item = TaskState>,
    {
        children
            .into_iter()
            .fold(own, |acc, s| if s.precedence() > acc.precedence() { s } else { acc })
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Created => "Created",
            TaskState::Initializing => "Initializing",
            TaskState::Running => "Running",
            TaskState::Success => "Success",
            TaskState::Failure => "Failure",
            TaskState::Unknown => "Unknown",
            TaskState::Abort => "Abort",
            TaskState::Aborted => "Aborted",
        };
        f.write_str(s)
    }
}

//! TaskStore port - durable source of truth for task rows.
//!
//! The executor writes every state change through this trait before it acts
//! on it, so a restarted process can rebuild the picture from the store alone.

use async_trait::async_trait;

use crate::domain::{TaskId, TaskInfo, TaskState};
use crate::error::ConductorError;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new row. Fails if the id exists or the position is taken
    /// under the same parent.
    async fn insert(&self, task: TaskInfo) -> Result<(), ConductorError>;

    async fn get(&self, id: TaskId) -> Result<Option<TaskInfo>, ConductorError>;

    /// Apply a state transition and return the updated row.
    ///
    /// Rejects moves the state model forbids with `IllegalStateTransition`.
    async fn update_state(
        &self,
        id: TaskId,
        state: TaskState,
        error: Option<String>,
    ) -> Result<TaskInfo, ConductorError>;

    /// Raise percent-done. Lower values are ignored.
    async fn update_percent(&self, id: TaskId, percent: u8) -> Result<(), ConductorError>;

    /// Direct children of `parent`, ordered by position.
    async fn subtasks(&self, parent: TaskId) -> Result<Vec<TaskInfo>, ConductorError>;

    /// Every row not yet in a terminal state.
    async fn incomplete(&self) -> Result<Vec<TaskInfo>, ConductorError>;
}

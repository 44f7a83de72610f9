//! InMemoryTaskStore - task rows kept in a process-local map.
//!
//! Used by tests and the CLI demo. Enforces the same invariants a database
//! implementation would: unique ids, unique positions per parent, and only
//! transitions the state model allows.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{TaskId, TaskInfo, TaskState};
use crate::error::ConductorError;
use crate::ports::{Clock, SystemClock, TaskStore};

pub struct InMemoryTaskStore {
    rows: Mutex<HashMap<TaskId, TaskInfo>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: TaskInfo) -> Result<(), ConductorError> {
        let mut rows = self.rows.lock().await;
        if rows.contains_key(&task.id) {
            return Err(ConductorError::Store(format!("duplicate task id {}", task.id)));
        }
        if let Some(parent) = task.parent_id {
            if !rows.contains_key(&parent) {
                return Err(ConductorError::TaskNotFound(parent));
            }
            let taken = rows
                .values()
                .any(|t| t.parent_id == Some(parent) && t.position == task.position);
            if taken {
                return Err(ConductorError::Store(format!(
                    "position {} already used under {parent}",
                    task.position
                )));
            }
        }
        rows.insert(task.id, task);
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<TaskInfo>, ConductorError> {
        Ok(self.rows.lock().await.get(&id).cloned())
    }

    async fn update_state(
        &self,
        id: TaskId,
        state: TaskState,
        error: Option<String>,
    ) -> Result<TaskInfo, ConductorError> {
        let now = self.clock.now();
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(&id).ok_or(ConductorError::TaskNotFound(id))?;
        row.transition_to(state, error, now)?;
        Ok(row.clone())
    }

    async fn update_percent(&self, id: TaskId, percent: u8) -> Result<(), ConductorError> {
        let now = self.clock.now();
        let mut rows = self.rows.lock().await;
        let row = rows.get_mut(&id).ok_or(ConductorError::TaskNotFound(id))?;
        row.record_progress(percent, now);
        Ok(())
    }

    async fn subtasks(&self, parent: TaskId) -> Result<Vec<TaskInfo>, ConductorError> {
        let rows = self.rows.lock().await;
        let mut children: Vec<TaskInfo> = rows
            .values()
            .filter(|t| t.parent_id == Some(parent))
            .cloned()
            .collect();
        children.sort_by_key(|t| t.position);
        Ok(children)
    }

    async fn incomplete(&self) -> Result<Vec<TaskInfo>, ConductorError> {
        let rows = self.rows.lock().await;
        let mut open: Vec<TaskInfo> = rows
            .values()
            .filter(|t| !t.state.is_terminal())
            .cloned()
            .collect();
        open.sort_by_key(|t| t.id);
        Ok(open)
    }
}

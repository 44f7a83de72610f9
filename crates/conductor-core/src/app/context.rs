//! Per-run context threaded through a task and its subtasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::runnable::RunnableTask;
use crate::config::ExecutionConfig;
use crate::domain::{TaskId, UniverseId};
use crate::error::ConductorError;

/// Task-scoped settings for one run. Built from `ExecutionConfig` and then
/// adjusted by the caller; never shared between runs.
#[derive(Debug)]
pub struct ExecutionContext {
    universe_id: UniverseId,
    blacklist_leaders: bool,
    leader_blacklist_wait: Duration,
    wait_for_server_ready_timeout: Duration,
    follower_lag_check_enabled: bool,
    /// Flipped by subtasks that disable the load balancer and must re-enable it.
    load_balancer_off: AtomicBool,
}

impl ExecutionContext {
    pub fn new(universe_id: UniverseId, config: &ExecutionConfig) -> Self {
        Self {
            universe_id,
            blacklist_leaders: config.blacklist_leaders,
            leader_blacklist_wait: Duration::from_millis(config.leader_blacklist_wait_ms),
            wait_for_server_ready_timeout: Duration::from_secs(
                config.wait_for_server_ready_timeout_secs,
            ),
            follower_lag_check_enabled: config.follower_lag_check_enabled,
            load_balancer_off: AtomicBool::new(false),
        }
    }

    pub fn with_blacklist_leaders(mut self, on: bool) -> Self {
        self.blacklist_leaders = on;
        self
    }

    pub fn with_leader_blacklist_wait(mut self, wait: Duration) -> Self {
        self.leader_blacklist_wait = wait;
        self
    }

    pub fn with_wait_for_server_ready_timeout(mut self, timeout: Duration) -> Self {
        self.wait_for_server_ready_timeout = timeout;
        self
    }

    pub fn with_follower_lag_check(mut self, on: bool) -> Self {
        self.follower_lag_check_enabled = on;
        self
    }

    pub fn universe_id(&self) -> UniverseId {
        self.universe_id
    }

    pub fn blacklist_leaders(&self) -> bool {
        self.blacklist_leaders
    }

    pub fn leader_blacklist_wait(&self) -> Duration {
        self.leader_blacklist_wait
    }

    pub fn wait_for_server_ready_timeout(&self) -> Duration {
        self.wait_for_server_ready_timeout
    }

    pub fn follower_lag_check_enabled(&self) -> bool {
        self.follower_lag_check_enabled
    }

    pub fn is_load_balancer_off(&self) -> bool {
        self.load_balancer_off.load(Ordering::Acquire)
    }

    pub fn set_load_balancer_off(&self, off: bool) {
        self.load_balancer_off.store(off, Ordering::Release);
    }
}

/// Handle given to a running handler: who it is, which root it belongs to,
/// and the abort signal to poll.
#[derive(Clone)]
pub struct TaskContext {
    task_id: TaskId,
    runnable: Arc<RunnableTask>,
}

impl TaskContext {
    pub(crate) fn new(task_id: TaskId, runnable: Arc<RunnableTask>) -> Self {
        Self { task_id, runnable }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn root_task_id(&self) -> TaskId {
        self.runnable.task_id()
    }

    pub fn is_root(&self) -> bool {
        self.task_id == self.runnable.task_id()
    }

    pub fn universe_id(&self) -> UniverseId {
        self.runnable.universe_id()
    }

    pub fn execution_context(&self) -> &ExecutionContext {
        self.runnable.execution_context()
    }

    /// The root this task runs under. Handlers use it to queue more groups.
    pub fn running_task(&self) -> &Arc<RunnableTask> {
        &self.runnable
    }

    pub fn is_abort_requested(&self) -> bool {
        self.runnable.is_abort_requested()
    }

    /// Resolves once abort has been requested.
    pub async fn abort_requested(&self) {
        self.runnable.abort_requested().await
    }

    /// Checkpoint: `Err(Cancelled)` if abort was requested.
    pub fn check_abort(&self) -> Result<(), ConductorError> {
        if self.is_abort_requested() {
            return Err(ConductorError::Cancelled(self.task_id));
        }
        Ok(())
    }

    /// Sleep for `period` unless abort arrives first.
    pub async fn sleep_or_abort(&self, period: Duration) -> Result<(), ConductorError> {
        tokio::select! {
            _ = tokio::time::sleep(period) => Ok(()),
            _ = self.abort_requested() => Err(ConductorError::Cancelled(self.task_id)),
        }
    }

    pub async fn set_percent_done(&self, percent: u8) -> Result<(), ConductorError> {
        self.runnable.update_percent(self.task_id, percent).await
    }
}

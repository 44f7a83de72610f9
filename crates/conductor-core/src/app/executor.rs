//! TaskExecutor - runs task trees on a bounded pool.
//!
//! One instance per process, built at start-up and handed to callers. It owns
//! the live-task registry; entries are removed only after the root's terminal
//! state has been persisted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, Semaphore};
use tracing::{error, info, warn};

use super::admission::AdmissionPolicy;
use super::context::ExecutionContext;
use super::handler::TaskHandler;
use super::recovery::{self, RecoveryReport};
use super::runnable::{RunnableTask, Shared, root_info};
use super::status::{self, TaskStatus};
use crate::config::ConductorConfig;
use crate::domain::{OperationType, TaskId, TaskState, UniverseId};
use crate::error::ConductorError;

/// Outcome of `TaskExecutor::shutdown`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Finished on their own within the drain window.
    pub drained: Vec<TaskId>,
    /// Force-interrupted and persisted as `Aborted`.
    pub interrupted: Vec<TaskId>,
}

struct Inner {
    shared: Arc<Shared>,
    admission: Arc<AdmissionPolicy>,
    registry: RwLock<HashMap<TaskId, Arc<RunnableTask>>>,
    task_permits: Semaphore,
    shutting_down: AtomicBool,
    config: ConductorConfig,
}

/// Runs root tasks on a bounded pool and keeps track of the live ones.
///
/// Cheap to clone; every clone shares the same registry and pools.
///
/// # Lifecycle of a task
/// 1. `create_runnable_task` persists the root row as `Created`.
/// 2. Groups are queued with `RunnableTask::add_sub_task_group`, before or
///    after submission.
/// 3. `submit` registers the task and hands it to the pool.
/// 4. The root body runs, then every queued group in order.
/// 5. The terminal state is persisted, the admission record is updated,
///    the registry entry is dropped and waiters are woken.
///
/// # Example
/// ```ignore
/// let executor = ExecutorBuilder::new().build()?;
/// executor.admission().can_admit(universe, OperationType::GFlagsUpgrade).await?;
///
/// let task = executor
///     .create_runnable_task(OperationType::GFlagsUpgrade, universe, params, Arc::new(SubTasksOnly))
///     .await?;
/// task.add_sub_task_group(update_gflags_group).await?;
/// executor.submit(task.clone()).await?;
///
/// match task.wait_for_completion().await {
///     TaskState::Success => {}
///     state => warn!(%state, "upgrade did not complete"),
/// }
/// ```
#[derive(Clone)]
pub struct TaskExecutor {
    inner: Arc<Inner>,
}

impl TaskExecutor {
    pub(crate) fn new(
        config: ConductorConfig,
        shared: Arc<Shared>,
        admission: Arc<AdmissionPolicy>,
    ) -> Self {
        let task_permits = Semaphore::new(config.executor.max_parallel_tasks);
        Self {
            inner: Arc::new(Inner {
                shared,
                admission,
                registry: RwLock::new(HashMap::new()),
                task_permits,
                shutting_down: AtomicBool::new(false),
                config,
            }),
        }
    }

    pub fn config(&self) -> &ConductorConfig {
        &self.inner.config
    }

    pub fn admission(&self) -> &AdmissionPolicy {
        &self.inner.admission
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Persist a `Created` root row and wrap it for execution, with an
    /// execution context built from configuration.
    pub async fn create_runnable_task(
        &self,
        operation: OperationType,
        universe_id: UniverseId,
        params: serde_json::Value,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<Arc<RunnableTask>, ConductorError> {
        let context = ExecutionContext::new(universe_id, &self.inner.config.execution);
        self.create_runnable_task_with_context(operation, params, handler, context)
            .await
    }

    pub async fn create_runnable_task_with_context(
        &self,
        operation: OperationType,
        params: serde_json::Value,
        handler: Arc<dyn TaskHandler>,
        context: ExecutionContext,
    ) -> Result<Arc<RunnableTask>, ConductorError> {
        if self.is_shutting_down() {
            return Err(ConductorError::ExecutorShuttingDown);
        }
        let universe_id = context.universe_id();
        let shared = &self.inner.shared;
        let info = root_info(shared, operation, universe_id, params);
        shared.store.insert(info.clone()).await?;
        Ok(Arc::new(RunnableTask::new(
            &info,
            operation,
            universe_id,
            handler,
            context,
            Arc::clone(shared),
        )))
    }

    /// Register the task and dispatch it. Returns as soon as it is queued.
    pub async fn submit(&self, task: Arc<RunnableTask>) -> Result<TaskId, ConductorError> {
        let task_id = task.task_id();
        {
            let mut registry = self.inner.registry.write().await;
            // checked under the registry lock so shutdown never misses an entry
            if self.is_shutting_down() {
                return Err(ConductorError::ExecutorShuttingDown);
            }
            if registry.contains_key(&task_id) || task.final_state().is_some() {
                return Err(ConductorError::fault(format!("task {task_id} was already submitted")));
            }
            registry.insert(task_id, Arc::clone(&task));
        }

        task.mark_queued();
        let this = self.clone();
        let runnable = Arc::clone(&task);
        let handle = tokio::spawn(async move { this.run(runnable).await });
        task.set_root_handle(handle);

        info!(
            task_id = %task_id,
            operation = %task.operation(),
            universe_id = %task.universe_id(),
            "task submitted"
        );
        Ok(task_id)
    }

    async fn run(&self, task: Arc<RunnableTask>) {
        let started = Instant::now();
        let state = match self.inner.task_permits.acquire().await {
            Ok(_permit) => {
                task.metrics().record_wait(task.task_type(), task.queued_for());
                info!(task_id = %task.task_id(), "task started");
                task.execute().await
            }
            Err(_) => {
                task.settle(task.task_id(), TaskState::Aborted, Some("executor closed".into()))
                    .await
            }
        };
        self.complete(&task, state, started.elapsed()).await;
    }

    async fn complete(&self, task: &RunnableTask, state: TaskState, elapsed: Duration) {
        let task_id = task.task_id();
        if let Err(e) = self
            .inner
            .admission
            .record_completion(task.universe_id(), task.operation(), task_id, state)
            .await
        {
            error!(task_id = %task_id, error = %e, "could not update admission record");
        }
        task.metrics()
            .record_execution(task.task_type(), state, elapsed);
        self.inner.registry.write().await.remove(&task_id);
        task.finish(state);
        info!(
            task_id = %task_id,
            %state,
            elapsed_ms = elapsed.as_millis() as u64,
            "task finished"
        );
    }

    /// Live task by id. A running body uses this to reach its own
    /// `RunnableTask` and queue more groups.
    pub async fn get_running_task(&self, task_id: TaskId) -> Option<Arc<RunnableTask>> {
        self.inner.registry.read().await.get(&task_id).cloned()
    }

    pub async fn running_task_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.inner.registry.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Request abort and wait up to `timeout` for the task to finish.
    ///
    /// Returns the final state, or `AbortTimeout` if the task is still
    /// running when the wait runs out. The abort request stays in force.
    pub async fn abort(&self, task_id: TaskId, timeout: Duration) -> Result<TaskState, ConductorError> {
        let Some(task) = self.get_running_task(task_id).await else {
            return match self.inner.shared.store.get(task_id).await? {
                Some(_) => Err(ConductorError::TaskNotRunning(task_id)),
                None => Err(ConductorError::TaskNotFound(task_id)),
            };
        };

        task.request_abort().await;
        match tokio::time::timeout(timeout, task.wait_for_completion()).await {
            Ok(state) => Ok(state),
            Err(_) => {
                warn!(task_id = %task_id, timeout_ms = timeout.as_millis() as u64, "abort not confirmed in time");
                Err(ConductorError::AbortTimeout { task_id, timeout })
            }
        }
    }

    pub async fn abort_default(&self, task_id: TaskId) -> Result<TaskState, ConductorError> {
        self.abort(task_id, self.inner.config.executor.abort_timeout())
            .await
    }

    /// Stop accepting work, wait up to `drain` for running tasks, then
    /// interrupt whatever is left.
    pub async fn shutdown(&self, drain: Duration) -> ShutdownReport {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        let running: Vec<Arc<RunnableTask>> = self
            .inner
            .registry
            .write()
            .await
            .values()
            .cloned()
            .collect();
        info!(in_flight = running.len(), drain_ms = drain.as_millis() as u64, "executor draining");

        let waits = join_all(running.iter().map(|t| t.wait_for_completion()));
        let _ = tokio::time::timeout(drain, waits).await;

        let mut report = ShutdownReport::default();
        for task in running {
            let task_id = task.task_id();
            if task.final_state().is_some() {
                report.drained.push(task_id);
                continue;
            }

            if let Some(handle) = task.force_interrupt() {
                let _ = handle.await;
            }
            // it may have finished between the drain timeout and the interrupt
            if task.final_state().is_some() {
                report.drained.push(task_id);
                continue;
            }

            task.abort_open_subtasks().await;
            let state = task
                .settle(task_id, TaskState::Aborted, Some("interrupted by shutdown".into()))
                .await;
            self.complete(&task, state, task.queued_for()).await;
            warn!(task_id = %task_id, %state, "task interrupted by shutdown");
            report.interrupted.push(task_id);
        }

        self.inner.task_permits.close();
        self.inner.shared.subtask_permits.close();
        info!(
            drained = report.drained.len(),
            interrupted = report.interrupted.len(),
            "executor stopped"
        );
        report
    }

    pub async fn shutdown_default(&self) -> ShutdownReport {
        self.shutdown(self.inner.config.executor.shutdown_drain())
            .await
    }

    /// Reconcile rows left unfinished by a previous process.
    pub async fn recover(&self) -> Result<RecoveryReport, ConductorError> {
        let live: HashSet<TaskId> = self.inner.registry.read().await.keys().copied().collect();
        recovery::reconcile(self.inner.shared.store.as_ref(), &self.inner.admission, &live).await
    }

    pub async fn task_status(&self, task_id: TaskId) -> Result<TaskStatus, ConductorError> {
        status::task_status(self.inner.shared.store.as_ref(), task_id).await
    }

    pub async fn rolled_up_state(&self, task_id: TaskId) -> Result<TaskState, ConductorError> {
        status::rolled_up_state(self.inner.shared.store.as_ref(), task_id).await
    }

    pub async fn percent_done(&self, task_id: TaskId) -> Result<u8, ConductorError> {
        self.inner
            .shared
            .store
            .get(task_id)
            .await?
            .map(|t| t.percent_done)
            .ok_or(ConductorError::TaskNotFound(task_id))
    }
}

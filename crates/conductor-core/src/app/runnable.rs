//! RunnableTask - execution-time wrapper around a persisted root task.
//!
//! Owns the queue of pending subtask groups, the abort signal and the
//! completion signal. Groups run strictly in order; members of one group run
//! concurrently and the group only completes once every member is terminal.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use super::context::{ExecutionContext, TaskContext};
use super::handler::{TaskHandler, run_handler};
use crate::domain::{
    OperationType, SubTaskGroupType, TaskId, TaskInfo, TaskState, TaskType, UniverseId,
};
use crate::error::ConductorError;
use crate::observability::TaskMetrics;
use crate::ports::{Clock, IdGenerator, TaskStore};

/// Collaborators every running task needs. One per executor.
pub(crate) struct Shared {
    pub store: Arc<dyn TaskStore>,
    pub metrics: Arc<dyn TaskMetrics>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub subtask_permits: Arc<Semaphore>,
    pub owner: String,
}

/// Ordered batch of sibling subtasks dispatched together.
pub struct SubTaskGroup {
    name: String,
    group_type: SubTaskGroupType,
    ignore_errors: bool,
    members: Vec<Arc<dyn TaskHandler>>,
}

impl SubTaskGroup {
    pub fn new(name: impl Into<String>, group_type: SubTaskGroupType) -> Self {
        Self {
            name: name.into(),
            group_type,
            ignore_errors: false,
            members: Vec::new(),
        }
    }

    /// Member failures are recorded but do not fail the group.
    pub fn ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    pub fn add_sub_task(&mut self, handler: Arc<dyn TaskHandler>) {
        self.members.push(handler);
    }

    pub fn with_sub_task(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.add_sub_task(handler);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

struct PendingGroup {
    name: String,
    group_type: SubTaskGroupType,
    ignore_errors: bool,
    members: Vec<(TaskId, Arc<dyn TaskHandler>)>,
}

/// A root task as the executor runs it.
///
/// # Groups
/// - Queued with `add_sub_task_group`; members are persisted as `Created`
///   right away, at positions that never repeat under the root.
/// - Run with `run_sub_tasks`, either by the body itself or by the executor
///   once the body returns. Each group is a barrier: the next one starts only
///   after every member of the current one is terminal.
/// - A failed group stops the run. Later groups stay `Created`.
///
/// # Abort
/// Abort is cooperative. The flag is checked before each group and each
/// subtask; long-running bodies poll it through `TaskContext`. A body that
/// never polls is only stopped by executor shutdown.
///
/// # Completion
/// `wait_for_completion` resolves once the executor has persisted the root's
/// terminal state and released it from the registry.
pub struct RunnableTask {
    task_id: TaskId,
    operation: OperationType,
    universe_id: UniverseId,
    task_type: TaskType,
    handler: Arc<dyn TaskHandler>,
    context: ExecutionContext,
    shared: Arc<Shared>,
    pending: Mutex<VecDeque<PendingGroup>>,
    next_position: AtomicI32,
    total_subtasks: AtomicU32,
    finished_subtasks: AtomicU32,
    abort_tx: watch::Sender<bool>,
    done_tx: watch::Sender<Option<TaskState>>,
    in_flight: StdMutex<HashMap<TaskId, AbortHandle>>,
    root_handle: StdMutex<Option<JoinHandle<()>>>,
    interrupted: AtomicBool,
    /// First group failure that was not ignored. Fails the root even if the
    /// body swallowed the error.
    failed: StdMutex<Option<(TaskId, String)>>,
    queued_at: StdMutex<Instant>,
}

impl std::fmt::Debug for RunnableTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnableTask")
            .field("task_id", &self.task_id)
            .field("operation", &self.operation)
            .field("universe_id", &self.universe_id)
            .field("final_state", &self.final_state())
            .finish()
    }
}

impl RunnableTask {
    pub(crate) fn new(
        info: &TaskInfo,
        operation: OperationType,
        universe_id: UniverseId,
        handler: Arc<dyn TaskHandler>,
        context: ExecutionContext,
        shared: Arc<Shared>,
    ) -> Self {
        let (abort_tx, _) = watch::channel(false);
        let (done_tx, _) = watch::channel(None);
        Self {
            task_id: info.id,
            operation,
            universe_id,
            task_type: info.task_type.clone(),
            handler,
            context,
            shared,
            pending: Mutex::new(VecDeque::new()),
            next_position: AtomicI32::new(0),
            total_subtasks: AtomicU32::new(0),
            finished_subtasks: AtomicU32::new(0),
            abort_tx,
            done_tx,
            in_flight: StdMutex::new(HashMap::new()),
            root_handle: StdMutex::new(None),
            interrupted: AtomicBool::new(false),
            failed: StdMutex::new(None),
            queued_at: StdMutex::new(Instant::now()),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn operation(&self) -> OperationType {
        self.operation
    }

    pub fn universe_id(&self) -> UniverseId {
        self.universe_id
    }

    pub fn task_type(&self) -> &TaskType {
        &self.task_type
    }

    pub fn execution_context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Terminal state once the executor has finished with this task.
    pub fn final_state(&self) -> Option<TaskState> {
        *self.done_tx.borrow()
    }

    pub fn is_abort_requested(&self) -> bool {
        *self.abort_tx.borrow()
    }

    pub(crate) async fn abort_requested(&self) {
        let mut rx = self.abort_tx.subscribe();
        // the sender lives as long as `self`, so this only returns on abort
        let _ = rx.wait_for(|aborted| *aborted).await;
    }

    /// Waits until the executor has persisted a terminal state.
    pub async fn wait_for_completion(&self) -> TaskState {
        let mut rx = self.done_tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(state) => state.unwrap_or(TaskState::Unknown),
            Err(_) => TaskState::Unknown,
        }
    }

    /// Number of subtask groups queued but not yet started.
    pub async fn pending_groups(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Persist the group's members as `Created` and queue the group.
    ///
    /// Members are numbered after every subtask already added, so positions
    /// stay unique under the root.
    pub async fn add_sub_task_group(
        &self,
        group: SubTaskGroup,
    ) -> Result<Vec<TaskId>, ConductorError> {
        if self.final_state().is_some() {
            return Err(ConductorError::TaskNotRunning(self.task_id));
        }

        let now = self.shared.clock.now();
        let mut members = Vec::with_capacity(group.members.len());
        for handler in group.members {
            let id = self.shared.ids.generate_task_id();
            let position = self.next_position.fetch_add(1, Ordering::SeqCst);
            let info = TaskInfo::subtask(
                id,
                handler.task_type(),
                self.task_id,
                position,
                group.group_type,
                handler.params(),
                self.shared.owner.clone(),
                now,
            );
            self.shared.store.insert(info).await?;
            members.push((id, handler));
        }
        self.total_subtasks
            .fetch_add(members.len() as u32, Ordering::SeqCst);

        let ids = members.iter().map(|(id, _)| *id).collect();
        debug!(
            task_id = %self.task_id,
            group = %group.name,
            group_type = %group.group_type,
            size = members.len(),
            "subtask group queued"
        );
        self.pending.lock().await.push_back(PendingGroup {
            name: group.name,
            group_type: group.group_type,
            ignore_errors: group.ignore_errors,
            members,
        });
        Ok(ids)
    }

    /// Run every queued group in order, checking for abort at each boundary.
    ///
    /// Returns the first failure that was not ignored. Groups after a failed
    /// group stay queued and are never dispatched.
    pub async fn run_sub_tasks(self: &Arc<Self>) -> Result<(), ConductorError> {
        loop {
            if self.is_abort_requested() {
                return Err(ConductorError::Cancelled(self.task_id));
            }
            let next = self.pending.lock().await.pop_front();
            let Some(group) = next else {
                return Ok(());
            };
            self.run_group(group).await?;
        }
    }

    async fn run_group(self: &Arc<Self>, group: PendingGroup) -> Result<(), ConductorError> {
        let PendingGroup {
            name,
            group_type,
            ignore_errors,
            members,
        } = group;
        info!(task_id = %self.task_id, group = %name, %group_type, size = members.len(), "running subtask group");

        let mut spawned = Vec::with_capacity(members.len());
        for (id, handler) in members {
            let this = Arc::clone(self);
            let join = tokio::spawn(async move { this.run_sub_task(id, handler).await });
            self.lock_in_flight().insert(id, join.abort_handle());
            spawned.push((id, join));
        }

        // every sibling runs to a terminal state, even after one fails
        let results = join_all(spawned.into_iter().map(|(id, join)| async move {
            match join.await {
                Ok(outcome) => (id, outcome),
                Err(e) if e.is_cancelled() => (id, (TaskState::Aborted, None)),
                Err(e) => (id, (TaskState::Failure, Some(format!("subtask crashed: {e}")))),
            }
        }))
        .await;

        {
            let mut in_flight = self.lock_in_flight();
            for (id, _) in &results {
                in_flight.remove(id);
            }
        }

        let mut first_failure = None;
        let mut aborted = false;
        for (id, (state, error)) in results {
            match state {
                TaskState::Failure if first_failure.is_none() => {
                    first_failure = Some((id, error.unwrap_or_default()));
                }
                TaskState::Aborted => aborted = true,
                _ => {}
            }
        }

        if aborted || self.is_abort_requested() {
            return Err(ConductorError::Cancelled(self.task_id));
        }
        match first_failure {
            Some((task_id, message)) if !ignore_errors => {
                warn!(task_id = %self.task_id, subtask_id = %task_id, group = %name, "subtask group failed");
                self.failed
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .get_or_insert_with(|| (task_id, message.clone()));
                Err(ConductorError::SubtaskFailure { task_id, message })
            }
            Some((task_id, _)) => {
                debug!(task_id = %self.task_id, subtask_id = %task_id, group = %name, "ignoring subtask failure");
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn run_sub_task(
        self: Arc<Self>,
        id: TaskId,
        handler: Arc<dyn TaskHandler>,
    ) -> (TaskState, Option<String>) {
        let store = &self.shared.store;
        let _permit = match Arc::clone(&self.shared.subtask_permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                let msg = "subtask pool closed".to_string();
                let state = self.settle(id, TaskState::Aborted, Some(msg.clone())).await;
                return (state, Some(msg));
            }
        };

        let started = Instant::now();
        let outcome = if self.is_abort_requested() {
            Err(ConductorError::Cancelled(id))
        } else {
            match self.start(id).await {
                Ok(()) => {
                    let ctx = TaskContext::new(id, Arc::clone(&self));
                    run_handler(Arc::clone(&handler), ctx).await
                }
                Err(e) => Err(e),
            }
        };

        let (state, error) = self.outcome(outcome);
        let state = self.settle(id, state, error.clone()).await;
        debug!(
            task_id = %self.task_id,
            subtask_id = %id,
            task_type = %handler.task_type(),
            %state,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "subtask finished"
        );

        let finished = self.finished_subtasks.fetch_add(1, Ordering::SeqCst) + 1;
        let total = self.total_subtasks.load(Ordering::SeqCst).max(1);
        // the body may still queue more groups, so only Success reports 100
        let percent = (finished.saturating_mul(100) / total).min(99) as u8;
        if let Err(e) = store.update_percent(self.task_id, percent).await {
            debug!(task_id = %self.task_id, error = %e, "progress update skipped");
        }
        (state, error)
    }

    /// Root body, then whatever groups are still queued. Returns the
    /// persisted terminal state of the root.
    pub(crate) async fn execute(self: &Arc<Self>) -> TaskState {
        let outcome = if self.is_abort_requested() {
            Err(ConductorError::Cancelled(self.task_id))
        } else {
            match self.start(self.task_id).await {
                Ok(()) => {
                    let ctx = TaskContext::new(self.task_id, Arc::clone(self));
                    match run_handler(Arc::clone(&self.handler), ctx).await {
                        Ok(()) => self.run_sub_tasks().await,
                        Err(e) => Err(e),
                    }
                }
                Err(e) => Err(e),
            }
        };
        let outcome = match (outcome, self.group_failure()) {
            (Ok(()), Some((task_id, message))) => {
                warn!(task_id = %self.task_id, subtask_id = %task_id, "body finished after a failed group");
                Err(ConductorError::SubtaskFailure { task_id, message })
            }
            (outcome, _) => outcome,
        };
        let (state, error) = self.outcome(outcome);
        self.settle(self.task_id, state, error).await
    }

    fn group_failure(&self) -> Option<(TaskId, String)> {
        self.failed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn start(&self, id: TaskId) -> Result<(), ConductorError> {
        let store = &self.shared.store;
        store.update_state(id, TaskState::Initializing, None).await?;
        store.update_state(id, TaskState::Running, None).await?;
        Ok(())
    }

    fn outcome(&self, result: Result<(), ConductorError>) -> (TaskState, Option<String>) {
        match result {
            Ok(()) => (TaskState::Success, None),
            Err(ConductorError::Cancelled(_)) => (TaskState::Aborted, None),
            Err(e) if self.is_abort_requested() => (TaskState::Aborted, Some(e.to_string())),
            Err(e) => (TaskState::Failure, Some(e.to_string())),
        }
    }

    /// Persist a terminal state. If the row already moved on, report what it
    /// holds instead.
    pub(crate) async fn settle(
        &self,
        id: TaskId,
        state: TaskState,
        error: Option<String>,
    ) -> TaskState {
        let store = &self.shared.store;
        match store.update_state(id, state, error).await {
            Ok(row) => row.state,
            Err(e) => {
                warn!(task_id = %id, target_state = %state, error = %e, "could not persist terminal state");
                match store.get(id).await {
                    Ok(Some(row)) => row.state,
                    _ => TaskState::Unknown,
                }
            }
        }
    }

    pub(crate) async fn update_percent(&self, id: TaskId, percent: u8) -> Result<(), ConductorError> {
        self.shared.store.update_percent(id, percent).await
    }

    /// Raise the abort flag, then mark the root and in-flight subtasks `Abort`.
    pub(crate) async fn request_abort(&self) {
        self.abort_tx.send_replace(true);

        let mut ids = vec![self.task_id];
        ids.extend(self.lock_in_flight().keys().copied());
        for id in ids {
            if let Err(e) = self.shared.store.update_state(id, TaskState::Abort, None).await {
                // the row may have reached a terminal state already
                debug!(task_id = %id, error = %e, "abort mark skipped");
            }
        }
        info!(task_id = %self.task_id, "abort requested");
    }

    /// Stop the root worker and every in-flight subtask without waiting for
    /// them to observe the abort flag.
    pub(crate) fn force_interrupt(&self) -> Option<JoinHandle<()>> {
        self.abort_tx.send_replace(true);
        self.interrupted.store(true, Ordering::SeqCst);
        for handle in self.lock_in_flight().values() {
            handle.abort();
        }
        let root = self
            .root_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = &root {
            handle.abort();
        }
        root
    }

    /// Mark every started but unfinished subtask `Aborted`.
    pub(crate) async fn abort_open_subtasks(&self) {
        let subtasks = match self.shared.store.subtasks(self.task_id).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(task_id = %self.task_id, error = %e, "could not list subtasks");
                return;
            }
        };
        for row in subtasks {
            if matches!(
                row.state,
                TaskState::Initializing | TaskState::Running | TaskState::Abort
            ) {
                self.settle(row.id, TaskState::Aborted, Some("interrupted by shutdown".into()))
                    .await;
            }
        }
    }

    /// Keep the root worker's handle. A handle arriving after an interrupt
    /// is aborted on the spot.
    pub(crate) fn set_root_handle(&self, handle: JoinHandle<()>) {
        let mut slot = self.root_handle.lock().unwrap_or_else(|e| e.into_inner());
        if self.interrupted.load(Ordering::SeqCst) {
            handle.abort();
        }
        *slot = Some(handle);
    }

    pub(crate) fn mark_queued(&self) {
        *self.queued_at.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub(crate) fn queued_for(&self) -> std::time::Duration {
        self.queued_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    pub(crate) fn finish(&self, state: TaskState) {
        self.done_tx.send_replace(Some(state));
    }

    pub(crate) fn metrics(&self) -> &Arc<dyn TaskMetrics> {
        &self.shared.metrics
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, AbortHandle>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Root row for a new task.
pub(crate) fn root_info(
    shared: &Shared,
    operation: OperationType,
    universe_id: UniverseId,
    params: serde_json::Value,
) -> TaskInfo {
    TaskInfo::root(
        shared.ids.generate_task_id(),
        operation,
        universe_id,
        params,
        shared.owner.clone(),
        shared.clock.now(),
    )
}

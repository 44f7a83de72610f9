//! ExecutorBuilder - wiring for the task executor.
//!
//! Every port has an in-memory default, so `ExecutorBuilder::new().build()`
//! gives a working executor for tests and the CLI. Configuration is
//! validated before anything is created.

use std::sync::Arc;

use tokio::sync::Semaphore;

use super::admission::AdmissionPolicy;
use super::executor::TaskExecutor;
use super::runnable::Shared;
use crate::config::{ConductorConfig, ConfigError};
use crate::impls::{InMemoryTaskStore, InMemoryUniverseStore};
use crate::observability::{NoopMetrics, TaskMetrics};
use crate::ports::{Clock, IdGenerator, SystemClock, TaskStore, UlidGenerator, UniverseStore};

/// # Example
/// ```ignore
/// let executor = ExecutorBuilder::new()
///     .with_config(ConductorConfig::load(None)?)
///     .task_store(Arc::new(PostgresTaskStore::connect(url).await?))
///     .build()?;
/// ```
pub struct ExecutorBuilder {
    config: ConductorConfig,
    task_store: Option<Arc<dyn TaskStore>>,
    universe_store: Option<Arc<dyn UniverseStore>>,
    metrics: Option<Arc<dyn TaskMetrics>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl ExecutorBuilder {
    pub fn new() -> Self {
        Self {
            config: ConductorConfig::default(),
            task_store: None,
            universe_store: None,
            metrics: None,
            clock: None,
            ids: None,
        }
    }

    pub fn with_config(mut self, config: ConductorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.task_store = Some(store);
        self
    }

    pub fn universe_store(mut self, store: Arc<dyn UniverseStore>) -> Self {
        self.universe_store = Some(store);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn TaskMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Validate configuration and wire the executor.
    pub fn build(self) -> Result<TaskExecutor, BuildError> {
        self.config.validate()?;

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids: Arc<dyn IdGenerator> = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let store: Arc<dyn TaskStore> = self
            .task_store
            .unwrap_or_else(|| Arc::new(InMemoryTaskStore::with_clock(Arc::clone(&clock))));
        let universes: Arc<dyn UniverseStore> = self
            .universe_store
            .unwrap_or_else(|| Arc::new(InMemoryUniverseStore::new()));
        let metrics: Arc<dyn TaskMetrics> = self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics));

        let shared = Arc::new(Shared {
            store,
            metrics,
            clock: Arc::clone(&clock),
            ids,
            subtask_permits: Arc::new(Semaphore::new(self.config.executor.max_parallel_subtasks)),
            owner: self.config.executor.owner.clone(),
        });
        let admission = Arc::new(AdmissionPolicy::new(universes, clock));
        Ok(TaskExecutor::new(self.config, shared, admission))
    }
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OperationType, TaskState, UniverseId};
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};

    #[test]
    fn build_with_defaults() {
        let exec = ExecutorBuilder::new().build().unwrap();
        assert_eq!(exec.config().executor.max_parallel_tasks, 10);
        assert!(!exec.is_shutting_down());
    }

    #[test]
    fn build_rejects_invalid_config() {
        let mut config = ConductorConfig::default();
        config.executor.max_parallel_subtasks = 0;
        let res = ExecutorBuilder::new().with_config(config).build();
        assert!(matches!(res, Err(BuildError::Config(ConfigError::Invalid(_)))));
    }

    #[tokio::test]
    async fn injected_clock_stamps_rows_and_ids() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let exec = ExecutorBuilder::new()
            .clock(Arc::new(FixedClock::new(t0)))
            .build()
            .unwrap();
        let task = exec
            .create_runnable_task(
                OperationType::EditUniverse,
                UniverseId::generate(),
                serde_json::json!({}),
                Arc::new(crate::app::SubTasksOnly),
            )
            .await
            .unwrap();
        assert_eq!(task.task_id().as_ulid().timestamp_ms(), t0.timestamp_millis() as u64);

        let status = exec.task_status(task.task_id()).await.unwrap();
        assert_eq!(status.created_at, t0);
        assert_eq!(status.state, TaskState::Created);
    }
}

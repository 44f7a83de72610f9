//! Admission control for operations against a universe.
//!
//! A universe is frozen when its last placement-modifying task did not
//! succeed. While frozen, only operations marked safe are admitted, plus a
//! re-run of the exact task that froze it when that operation is re-runnable.
//! All reads and updates of one universe's record are serialized by a
//! per-universe lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::{AdmissionRecord, OperationType, TaskId, TaskState, UniverseId};
use crate::error::ConductorError;
use crate::ports::{Clock, UniverseStore};

/// What may currently run against a universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedTasks {
    /// Universe is frozen; only `operations` are admitted.
    pub restricted: bool,
    /// The blocking task itself may be re-run.
    pub rerun_allowed: bool,
    pub blocking_task_id: Option<TaskId>,
    pub blocking_operation: Option<OperationType>,
    pub operations: Vec<OperationType>,
}

pub struct AdmissionPolicy {
    store: Arc<dyn UniverseStore>,
    clock: Arc<dyn Clock>,
    locks: StdMutex<HashMap<UniverseId, Arc<Mutex<()>>>>,
}

impl AdmissionPolicy {
    pub fn new(store: Arc<dyn UniverseStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, universe_id: UniverseId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(universe_id).or_default())
    }

    /// May `operation` start on `universe_id` now?
    pub async fn can_admit(
        &self,
        universe_id: UniverseId,
        operation: OperationType,
    ) -> Result<(), ConductorError> {
        self.check(universe_id, operation, None).await
    }

    /// May `failed_task` (of type `operation`) be run again?
    pub async fn can_rerun(
        &self,
        universe_id: UniverseId,
        operation: OperationType,
        failed_task: TaskId,
    ) -> Result<(), ConductorError> {
        self.check(universe_id, operation, Some(failed_task)).await
    }

    async fn check(
        &self,
        universe_id: UniverseId,
        operation: OperationType,
        rerun_of: Option<TaskId>,
    ) -> Result<(), ConductorError> {
        let lock = self.lock_for(universe_id);
        let _guard = lock.lock().await;
        let record = self.store.load(universe_id).await?;
        let decision = decide(universe_id, record.as_ref(), operation, rerun_of);
        if let Err(e) = &decision {
            info!(universe_id = %universe_id, %operation, reason = %e, "operation not admitted");
        }
        decision
    }

    /// Update the record after a root task reached `state`.
    ///
    /// Only placement-modifying operations touch the record: success clears
    /// the frozen flag, any other terminal state sets it.
    pub async fn record_completion(
        &self,
        universe_id: UniverseId,
        operation: OperationType,
        task_id: TaskId,
        state: TaskState,
    ) -> Result<(), ConductorError> {
        if !operation.is_placement_modification() || !state.is_terminal() {
            return Ok(());
        }

        let lock = self.lock_for(universe_id);
        let _guard = lock.lock().await;
        let now = self.clock.now();
        let mut record = self
            .store
            .load(universe_id)
            .await?
            .unwrap_or_else(|| AdmissionRecord::new(universe_id, now));

        if state == TaskState::Success {
            if record.frozen {
                info!(universe_id = %universe_id, %task_id, %operation, "universe unfrozen");
            }
            record.clear(now);
        } else {
            warn!(universe_id = %universe_id, %task_id, %operation, %state, "universe frozen");
            record.freeze(task_id, operation, now);
        }
        self.store.save(record).await
    }

    /// Current record, or a fresh unfrozen one if none was stored.
    pub async fn record(&self, universe_id: UniverseId) -> Result<AdmissionRecord, ConductorError> {
        Ok(self
            .store
            .load(universe_id)
            .await?
            .unwrap_or_else(|| AdmissionRecord::new(universe_id, self.clock.now())))
    }

    pub async fn is_frozen(&self, universe_id: UniverseId) -> Result<bool, ConductorError> {
        Ok(self.record(universe_id).await?.frozen)
    }

    /// Every universe currently frozen, with its blocking task.
    pub async fn frozen_universes(&self) -> Result<Vec<AdmissionRecord>, ConductorError> {
        self.store.frozen().await
    }

    pub async fn allowed_tasks(&self, universe_id: UniverseId) -> Result<AllowedTasks, ConductorError> {
        let record = self.record(universe_id).await?;
        Ok(allowed_tasks(&record))
    }
}

/// Pure admission rule over a stored record.
pub fn decide(
    universe_id: UniverseId,
    record: Option<&AdmissionRecord>,
    operation: OperationType,
    rerun_of: Option<TaskId>,
) -> Result<(), ConductorError> {
    let Some(record) = record.filter(|r| r.frozen) else {
        return Ok(());
    };
    if operation.is_safe_if_frozen() {
        return Ok(());
    }
    let is_rerun = rerun_of.is_some()
        && rerun_of == record.blocking_task_id
        && Some(operation) == record.blocking_operation;
    if is_rerun && operation.is_rerunnable() {
        return Ok(());
    }
    Err(ConductorError::AdmissionDenied {
        universe_id,
        operation,
        blocking_task_id: record.blocking_task_id,
        blocking_operation: record.blocking_operation,
    })
}

pub fn allowed_tasks(record: &AdmissionRecord) -> AllowedTasks {
    if !record.frozen {
        return AllowedTasks {
            restricted: false,
            rerun_allowed: false,
            blocking_task_id: None,
            blocking_operation: None,
            operations: OperationType::ALL.to_vec(),
        };
    }

    let rerun_op = record.blocking_operation.filter(|op| op.is_rerunnable());
    let mut operations = OperationType::safe_if_frozen().to_vec();
    operations.extend(rerun_op);
    AllowedTasks {
        restricted: true,
        rerun_allowed: rerun_op.is_some(),
        blocking_task_id: record.blocking_task_id,
        blocking_operation: record.blocking_operation,
        operations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryUniverseStore;
    use crate::ports::SystemClock;

    fn policy() -> AdmissionPolicy {
        AdmissionPolicy::new(Arc::new(InMemoryUniverseStore::new()), Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn unfrozen_universe_admits_everything() {
        let p = policy();
        let u = UniverseId::generate();
        for op in OperationType::ALL {
            assert!(p.can_admit(u, *op).await.is_ok(), "{op}");
        }
    }

    #[tokio::test]
    async fn frozen_universe_admits_only_safe_operations() {
        let p = policy();
        let u = UniverseId::generate();
        let blocker = TaskId::generate();
        p.record_completion(u, OperationType::GFlagsUpgrade, blocker, TaskState::Failure)
            .await
            .unwrap();

        for op in OperationType::ALL {
            let res = p.can_admit(u, *op).await;
            if op.is_safe_if_frozen() {
                assert!(res.is_ok(), "{op} should be admitted");
            } else {
                match res {
                    Err(ConductorError::AdmissionDenied {
                        blocking_task_id, ..
                    }) => assert_eq!(blocking_task_id, Some(blocker)),
                    other => panic!("{op}: expected denial, got {other:?}"),
                }
            }
        }
    }

    #[tokio::test]
    async fn only_the_blocking_rerunnable_task_may_rerun() {
        let p = policy();
        let u = UniverseId::generate();
        let blocker = TaskId::generate();
        p.record_completion(u, OperationType::RestartUniverse, blocker, TaskState::Aborted)
            .await
            .unwrap();

        assert!(p.can_rerun(u, OperationType::RestartUniverse, blocker).await.is_ok());
        assert!(p
            .can_rerun(u, OperationType::RestartUniverse, TaskId::generate())
            .await
            .is_err());
        assert!(p.can_rerun(u, OperationType::GFlagsUpgrade, blocker).await.is_err());
        assert!(p.can_admit(u, OperationType::RestartUniverse).await.is_err());
    }

    #[test]
    fn rerun_admission_is_exhaustive_over_operations() {
        let u = UniverseId::generate();
        let blocker = TaskId::generate();
        let now = chrono::Utc::now();
        for blocking_op in OperationType::ALL
            .iter()
            .filter(|op| op.is_placement_modification())
        {
            let mut record = AdmissionRecord::new(u, now);
            record.freeze(blocker, *blocking_op, now);
            let allowed = decide(u, Some(&record), *blocking_op, Some(blocker)).is_ok();
            assert_eq!(allowed, blocking_op.is_rerunnable(), "{blocking_op}");
            assert_eq!(record.retry_eligible, blocking_op.is_rerunnable());
        }
    }

    #[tokio::test]
    async fn success_clears_and_non_placement_ops_are_ignored() {
        let p = policy();
        let u = UniverseId::generate();
        p.record_completion(u, OperationType::SoftwareUpgrade, TaskId::generate(), TaskState::Failure)
            .await
            .unwrap();
        assert!(p.is_frozen(u).await.unwrap());

        // a backup succeeding does not unfreeze
        p.record_completion(u, OperationType::CreateBackup, TaskId::generate(), TaskState::Success)
            .await
            .unwrap();
        assert!(p.is_frozen(u).await.unwrap());

        p.record_completion(u, OperationType::SoftwareUpgrade, TaskId::generate(), TaskState::Success)
            .await
            .unwrap();
        let record = p.record(u).await.unwrap();
        assert!(!record.frozen);
        assert_eq!(record.blocking_task_id, None);
        assert!(p.frozen_universes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn allowed_tasks_lists_safe_ops_and_rerun() {
        let p = policy();
        let u = UniverseId::generate();
        assert!(!p.allowed_tasks(u).await.unwrap().restricted);

        let blocker = TaskId::generate();
        p.record_completion(u, OperationType::VMImageUpgrade, blocker, TaskState::Failure)
            .await
            .unwrap();
        let allowed = p.allowed_tasks(u).await.unwrap();
        assert!(allowed.restricted);
        assert!(allowed.rerun_allowed);
        assert_eq!(allowed.blocking_task_id, Some(blocker));
        assert!(allowed.operations.contains(&OperationType::CreateBackup));
        assert!(allowed.operations.contains(&OperationType::VMImageUpgrade));
        assert!(!allowed.operations.contains(&OperationType::EditUniverse));
    }

    #[tokio::test]
    async fn concurrent_failures_leave_a_consistent_record() {
        let p = Arc::new(policy());
        let u = UniverseId::generate();
        let a = TaskId::generate();
        let b = TaskId::generate();

        let (ra, rb) = tokio::join!(
            p.record_completion(u, OperationType::GFlagsUpgrade, a, TaskState::Failure),
            p.record_completion(u, OperationType::SoftwareUpgrade, b, TaskState::Failure),
        );
        ra.unwrap();
        rb.unwrap();

        let record = p.record(u).await.unwrap();
        assert!(record.frozen);
        assert_eq!(p.frozen_universes().await.unwrap(), vec![record.clone()]);
        let pair = (record.blocking_task_id, record.blocking_operation);
        assert!(
            pair == (Some(a), Some(OperationType::GFlagsUpgrade))
                || pair == (Some(b), Some(OperationType::SoftwareUpgrade)),
            "mixed metadata: {pair:?}"
        );
    }
}

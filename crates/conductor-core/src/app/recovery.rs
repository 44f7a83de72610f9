//! Reconcile task rows left unfinished by a previous process.
//!
//! Must run before admission decisions for the affected universes are
//! trusted: a root that died mid-flight never got to freeze its universe.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::admission::AdmissionPolicy;
use crate::domain::{TaskId, TaskState, UniverseId};
use crate::error::ConductorError;
use crate::ports::TaskStore;

const RESTART_DETAIL: &str = "interrupted by process restart";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub failed: Vec<TaskId>,
    pub aborted: Vec<TaskId>,
    pub frozen_universes: Vec<UniverseId>,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.failed.is_empty() && self.aborted.is_empty()
    }
}

/// Move every non-terminal row not owned by a live task to a terminal state.
///
/// Rows under a parent that is already terminal are left alone: they are
/// groups that were never dispatched because the root failed or aborted.
///
/// `Abort` rows become `Aborted`; everything else becomes `Failure`. Roots of
/// placement-modifying operations freeze their universe.
pub(crate) async fn reconcile(
    store: &dyn TaskStore,
    admission: &AdmissionPolicy,
    live: &HashSet<TaskId>,
) -> Result<RecoveryReport, ConductorError> {
    let mut report = RecoveryReport::default();
    let rows = store.incomplete().await?;
    let open: HashSet<TaskId> = rows.iter().map(|r| r.id).collect();

    for row in rows {
        let owned_by_live = live.contains(&row.id) || row.parent_id.is_some_and(|p| live.contains(&p));
        if owned_by_live {
            continue;
        }
        // a parent missing from the open set already settled; its undispatched
        // members keep the outcome the parent recorded
        if row.parent_id.is_some_and(|p| !open.contains(&p)) {
            continue;
        }

        let (target, detail) = match row.state {
            TaskState::Abort => (TaskState::Aborted, None),
            _ => (TaskState::Failure, Some(RESTART_DETAIL.to_string())),
        };
        let updated = match store.update_state(row.id, target, detail).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(task_id = %row.id, error = %e, "could not reconcile task");
                continue;
            }
        };
        match updated.state {
            TaskState::Aborted => report.aborted.push(row.id),
            _ => report.failed.push(row.id),
        }

        if let (Some(operation), Some(universe_id)) = (row.operation, row.universe_id) {
            if row.is_root() && operation.is_placement_modification() {
                admission
                    .record_completion(universe_id, operation, row.id, updated.state)
                    .await?;
                if !report.frozen_universes.contains(&universe_id) {
                    report.frozen_universes.push(universe_id);
                }
            }
        }
    }

    if !report.is_empty() {
        info!(
            failed = report.failed.len(),
            aborted = report.aborted.len(),
            frozen = report.frozen_universes.len(),
            "reconciled unfinished tasks"
        );
    }
    Ok(report)
}

//! Node lifecycle state machine.
//!
//! Each `NodeState` statically declares the actions it permits. Legality is a
//! table lookup on (current state, requested action); this module never
//! computes a next state. The caller performs the action and then persists
//! whatever state it lands in.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConductorError;

/// Action that may be requested against a cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeActionType {
    Add,
    Remove,
    Start,
    Stop,
    Delete,
    Query,
    Release,
    Reboot,
    StartMaster,
    /// Runs against a node not yet attached to a universe.
    PrecheckDetached,
    HardReboot,
    Reprovision,
    Replace,
    Decommission,
}

impl NodeActionType {
    pub const ALL: [NodeActionType; 14] = [
        NodeActionType::Add,
        NodeActionType::Remove,
        NodeActionType::Start,
        NodeActionType::Stop,
        NodeActionType::Delete,
        NodeActionType::Query,
        NodeActionType::Release,
        NodeActionType::Reboot,
        NodeActionType::StartMaster,
        NodeActionType::PrecheckDetached,
        NodeActionType::HardReboot,
        NodeActionType::Reprovision,
        NodeActionType::Replace,
        NodeActionType::Decommission,
    ];

    pub fn is_for_detached(self) -> bool {
        self == NodeActionType::PrecheckDetached
    }

    /// Human readable progress label, e.g. "Stopping" / "Stopped".
    pub fn progress_label(self, completed: bool) -> &'static str {
        let (running, done) = match self {
            NodeActionType::Add => ("Adding", "Added"),
            NodeActionType::Remove => ("Removing", "Removed"),
            NodeActionType::Start => ("Starting", "Started"),
            NodeActionType::Stop => ("Stopping", "Stopped"),
            NodeActionType::Delete => ("Deleting", "Deleted"),
            NodeActionType::Query => ("Queries", "Queries"),
            NodeActionType::Release => ("Releasing", "Released"),
            NodeActionType::Reboot => ("Rebooting", "Rebooted"),
            NodeActionType::StartMaster => ("Starting Master", "Started Master"),
            NodeActionType::PrecheckDetached => {
                ("Performing preflight check", "Performed preflight check")
            }
            NodeActionType::HardReboot => ("Hard rebooting", "Hard rebooted"),
            NodeActionType::Reprovision => ("Re-provisioning", "Re-provisioned"),
            NodeActionType::Replace => ("Replacing", "Replaced"),
            NodeActionType::Decommission => ("Decommissioning", "Decommissioned"),
        };
        if completed { done } else { running }
    }
}

impl fmt::Display for NodeActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Lifecycle state of a cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    ToBeAdded,
    InstanceCreated,
    ServerSetup,
    ToJoinCluster,
    Reprovisioning,
    Provisioned,
    SoftwareInstalled,
    UpgradeMasterSoftware,
    UpgradeSoftware,
    RollbackUpgrade,
    FinalizeUpgrade,
    UpdateGFlags,
    Live,
    Stopping,
    Starting,
    Stopped,
    Unreachable,
    MetricsUnavailable,
    ToBeRemoved,
    Removing,
    Removed,
    Adding,
    BeingDecommissioned,
    Decommissioned,
    UpdateCert,
    ToggleTls,
    ConfigureDbApis,
    Resizing,
    SystemdUpgrade,
    Terminating,
    Terminated,
    Rebooting,
    HardRebooting,
    VmImageUpgrade,
}

impl NodeState {
    pub const ALL: [NodeState; 34] = [
        NodeState::ToBeAdded,
        NodeState::InstanceCreated,
        NodeState::ServerSetup,
        NodeState::ToJoinCluster,
        NodeState::Reprovisioning,
        NodeState::Provisioned,
        NodeState::SoftwareInstalled,
        NodeState::UpgradeMasterSoftware,
        NodeState::UpgradeSoftware,
        NodeState::RollbackUpgrade,
        NodeState::FinalizeUpgrade,
        NodeState::UpdateGFlags,
        NodeState::Live,
        NodeState::Stopping,
        NodeState::Starting,
        NodeState::Stopped,
        NodeState::Unreachable,
        NodeState::MetricsUnavailable,
        NodeState::ToBeRemoved,
        NodeState::Removing,
        NodeState::Removed,
        NodeState::Adding,
        NodeState::BeingDecommissioned,
        NodeState::Decommissioned,
        NodeState::UpdateCert,
        NodeState::ToggleTls,
        NodeState::ConfigureDbApis,
        NodeState::Resizing,
        NodeState::SystemdUpgrade,
        NodeState::Terminating,
        NodeState::Terminated,
        NodeState::Rebooting,
        NodeState::HardRebooting,
        NodeState::VmImageUpgrade,
    ];

    /// Actions permitted while a node sits in this state.
    ///
    /// Transient maintenance states permit nothing, so the operation that
    /// entered them is the only way out.
    pub fn allowed_actions(self) -> &'static [NodeActionType] {
        use NodeActionType as A;
        use NodeState::*;

        match self {
            ToBeAdded | InstanceCreated | ServerSetup | Provisioned => &[A::Delete, A::Add],
            ToJoinCluster => &[A::Remove, A::Add],
            SoftwareInstalled => &[A::Start, A::Delete, A::Add],
            Live => &[
                A::Stop,
                A::Remove,
                A::Query,
                A::Reboot,
                A::HardReboot,
                A::Replace,
                A::Decommission,
            ],
            Stopping => &[A::Stop, A::Remove],
            Starting => &[A::Start, A::Remove],
            Stopped => &[A::Start, A::Remove, A::Query, A::Reprovision],
            ToBeRemoved => &[A::Remove, A::Decommission],
            Removing => &[A::Remove],
            Removed => &[A::Add, A::Release],
            Adding => &[A::Delete, A::Release, A::Add, A::Remove],
            BeingDecommissioned => &[A::Release],
            Decommissioned => &[A::Add, A::Delete],
            Terminating => &[A::Release, A::Delete],
            Terminated => &[A::Delete],
            Rebooting => &[A::Reboot],
            HardRebooting => &[A::HardReboot],
            Reprovisioning | UpgradeMasterSoftware | UpgradeSoftware | RollbackUpgrade
            | FinalizeUpgrade | UpdateGFlags | Unreachable | MetricsUnavailable | UpdateCert
            | ToggleTls | ConfigureDbApis | Resizing | SystemdUpgrade | VmImageUpgrade => &[],
        }
    }

    pub fn is_action_allowed(self, action: NodeActionType) -> bool {
        self.allowed_actions().contains(&action)
    }

    /// Every state in which `action` is permitted, in declaration order.
    pub fn states_allowing(action: NodeActionType) -> Vec<NodeState> {
        NodeState::ALL
            .into_iter()
            .filter(|s| s.is_action_allowed(action))
            .collect()
    }

    /// Rejects `action` with the list of states that would have permitted it.
    pub fn validate(self, action: NodeActionType) -> Result<(), ConductorError> {
        if self.is_action_allowed(action) {
            return Ok(());
        }
        Err(ConductorError::InvalidTransition {
            state: self,
            action,
            allowed_states: NodeState::states_allowing(action),
        })
    }

    /// Not running a database process, or between lifecycle phases.
    pub fn is_in_transit(self) -> bool {
        matches!(
            self,
            NodeState::Removed
                | NodeState::Stopped
                | NodeState::Decommissioned
                | NodeState::Resizing
                | NodeState::Terminated
        )
    }

    pub fn is_running(self) -> bool {
        !matches!(
            self,
            NodeState::Unreachable
                | NodeState::MetricsUnavailable
                | NodeState::ToBeAdded
                | NodeState::Adding
                | NodeState::BeingDecommissioned
                | NodeState::Decommissioned
                | NodeState::Terminating
                | NodeState::Terminated
        )
    }

    pub fn is_software_deleted(self) -> bool {
        matches!(
            self,
            NodeState::Decommissioned | NodeState::Terminating | NodeState::Terminated
        )
    }

    /// Counts toward the universe's serving capacity.
    pub fn is_active(self) -> bool {
        (self.is_running() || self == NodeState::ToBeAdded)
            && !matches!(
                self,
                NodeState::ToBeRemoved
                    | NodeState::Removing
                    | NodeState::Removed
                    | NodeState::Starting
                    | NodeState::Stopping
                    | NodeState::Stopped
                    | NodeState::SystemdUpgrade
                    | NodeState::Rebooting
                    | NodeState::HardRebooting
            )
    }

    /// Processes on the node are expected to answer queries.
    pub fn is_queryable(self) -> bool {
        matches!(
            self,
            NodeState::UpgradeSoftware
                | NodeState::UpgradeMasterSoftware
                | NodeState::FinalizeUpgrade
                | NodeState::RollbackUpgrade
                | NodeState::UpdateGFlags
                | NodeState::Live
                | NodeState::ToBeRemoved
                | NodeState::Removing
                | NodeState::Stopping
                | NodeState::UpdateCert
                | NodeState::ToggleTls
        )
    }

    pub fn is_considered_running(self) -> bool {
        matches!(self, NodeState::Live | NodeState::ToBeRemoved)
    }

    pub fn is_removable(self) -> bool {
        self.is_action_allowed(NodeActionType::Delete)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn live_allows_stop() {
        assert!(NodeState::Live.validate(NodeActionType::Stop).is_ok());
    }

    #[test]
    fn decommissioned_rejects_stop() {
        let err = NodeState::Decommissioned
            .validate(NodeActionType::Stop)
            .unwrap_err();
        match err {
            ConductorError::InvalidTransition {
                state,
                action,
                allowed_states,
            } => {
                assert_eq!(state, NodeState::Decommissioned);
                assert_eq!(action, NodeActionType::Stop);
                assert_eq!(allowed_states, vec![NodeState::Live, NodeState::Stopping]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[rstest]
    #[case(NodeState::Resizing)]
    #[case(NodeState::UpgradeSoftware)]
    #[case(NodeState::UpdateGFlags)]
    #[case(NodeState::Unreachable)]
    #[case(NodeState::VmImageUpgrade)]
    fn transient_states_permit_nothing(#[case] state: NodeState) {
        for action in NodeActionType::ALL {
            assert!(
                matches!(
                    state.validate(action),
                    Err(ConductorError::InvalidTransition { .. })
                ),
                "{state} allowed {action}"
            );
        }
    }

    #[rstest]
    #[case(NodeState::Decommissioned, NodeActionType::Add, true)]
    #[case(NodeState::Decommissioned, NodeActionType::Delete, true)]
    #[case(NodeState::Stopped, NodeActionType::Reprovision, true)]
    #[case(NodeState::SoftwareInstalled, NodeActionType::Start, true)]
    #[case(NodeState::Removed, NodeActionType::Start, false)]
    #[case(NodeState::Terminated, NodeActionType::Add, false)]
    fn allowed_action_table(
        #[case] state: NodeState,
        #[case] action: NodeActionType,
        #[case] allowed: bool,
    ) {
        assert_eq!(state.is_action_allowed(action), allowed);
    }

    #[test]
    fn detached_precheck_is_never_allowed_on_attached_states() {
        assert!(NodeActionType::PrecheckDetached.is_for_detached());
        assert!(NodeState::states_allowing(NodeActionType::PrecheckDetached).is_empty());
    }

    #[test]
    fn predicates() {
        assert!(NodeState::Live.is_active());
        assert!(NodeState::ToBeAdded.is_active());
        assert!(!NodeState::Stopped.is_active());
        assert!(NodeState::Stopped.is_in_transit());
        assert!(NodeState::Terminating.is_software_deleted());
        assert!(!NodeState::Adding.is_running());
        assert!(NodeState::ToBeRemoved.is_considered_running());
        assert!(NodeState::Removing.is_queryable());
        assert!(NodeState::Adding.is_removable());
        assert!(!NodeState::Live.is_removable());
    }

    #[test]
    fn progress_labels() {
        assert_eq!(NodeActionType::HardReboot.progress_label(false), "Hard rebooting");
        assert_eq!(NodeActionType::Replace.progress_label(true), "Replaced");
        assert_eq!(NodeActionType::Query.progress_label(true), "Queries");
    }
}

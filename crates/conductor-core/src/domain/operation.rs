//! Operation types and their admission classification.
//!
//! Each root task carries an `OperationType`. The four classification sets
//! below are plain data: membership is a table lookup, nothing dispatches on
//! the variant.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! operation_types {
    ($($name:ident),+ $(,)?) => {
        /// Customer-facing operation against a universe.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum OperationType {
            $($name,)+
        }

        impl OperationType {
            /// Every declared operation, in declaration order.
            pub const ALL: &'static [OperationType] = &[$(OperationType::$name,)+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(OperationType::$name => stringify!($name),)+
                }
            }
        }

        impl FromStr for OperationType {
            type Err = UnknownOperation;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($name) => Ok(OperationType::$name),)+
                    other => Err(UnknownOperation(other.to_string())),
                }
            }
        }
    };
}

operation_types! {
    // universe lifecycle
    CreateUniverse,
    CreateKubernetesUniverse,
    EditUniverse,
    EditKubernetesUniverse,
    DestroyUniverse,
    DestroyKubernetesUniverse,
    PauseUniverse,
    ResumeUniverse,
    ResumeKubernetesUniverse,
    PauseXClusterUniverses,
    ResumeXClusterUniverses,
    ReadOnlyClusterCreate,
    ReadOnlyClusterDelete,
    // upgrades and restarts
    SoftwareUpgrade,
    SoftwareUpgradeYB,
    SoftwareKubernetesUpgrade,
    SoftwareKubernetesUpgradeYB,
    FinalizeUpgrade,
    FinalizeKubernetesUpgrade,
    RollbackUpgrade,
    RollbackKubernetesUpgrade,
    GFlagsUpgrade,
    GFlagsKubernetesUpgrade,
    KubernetesOverridesUpgrade,
    RestartUniverse,
    RestartUniverseKubernetesUpgrade,
    VMImageUpgrade,
    ThirdpartySoftwareUpgrade,
    CertsRotate,
    CertsRotateKubernetesUpgrade,
    TlsToggle,
    ResizeNode,
    MasterFailover,
    SyncMasterAddresses,
    // node actions
    AddNodeToUniverse,
    RemoveNodeFromUniverse,
    StartNodeInUniverse,
    StopNodeInUniverse,
    DeleteNodeFromUniverse,
    ReleaseInstanceFromUniverse,
    RebootNodeInUniverse,
    ReplaceNodeInUniverse,
    DecommissionNode,
    // backup, restore, schedules
    CreateBackup,
    BackupUniverse,
    MultiTableBackup,
    RestoreBackup,
    CreateBackupSchedule,
    CreateBackupScheduleKubernetes,
    EditBackupSchedule,
    EditBackupScheduleKubernetes,
    DeleteBackupSchedule,
    DeleteBackupScheduleKubernetes,
    // replication and recovery configs
    CreatePitrConfig,
    DeletePitrConfig,
    CreateXClusterConfig,
    EditXClusterConfig,
    DeleteXClusterConfig,
    RestartXClusterConfig,
    SyncXClusterConfig,
    CreateDrConfig,
    SetTablesDrConfig,
    RestartDrConfig,
    EditDrConfig,
    SwitchoverDrConfig,
    FailoverDrConfig,
    SyncDrConfig,
    DeleteDrConfig,
    // support
    CreateSupportBundle,
    ReinstallNodeAgent,
    EnableNodeAgentInUniverse,
}

/// (a) Operations that change cluster placement or topology. A failure of any
/// of these freezes the universe.
const PLACEMENT_MODIFICATION: &[OperationType] = &[
    OperationType::CreateUniverse,
    OperationType::CreateKubernetesUniverse,
    OperationType::ReadOnlyClusterCreate,
    OperationType::ReadOnlyClusterDelete,
    OperationType::ResizeNode,
    OperationType::KubernetesOverridesUpgrade,
    OperationType::GFlagsKubernetesUpgrade,
    OperationType::SoftwareKubernetesUpgrade,
    OperationType::SoftwareKubernetesUpgradeYB,
    OperationType::EditKubernetesUniverse,
    OperationType::RestartUniverseKubernetesUpgrade,
    OperationType::CertsRotateKubernetesUpgrade,
    OperationType::GFlagsUpgrade,
    OperationType::SoftwareUpgrade,
    OperationType::SoftwareUpgradeYB,
    OperationType::FinalizeUpgrade,
    OperationType::FinalizeKubernetesUpgrade,
    OperationType::RollbackUpgrade,
    OperationType::RollbackKubernetesUpgrade,
    OperationType::RestartUniverse,
    OperationType::RebootNodeInUniverse,
    OperationType::VMImageUpgrade,
    OperationType::ThirdpartySoftwareUpgrade,
    OperationType::CertsRotate,
    OperationType::TlsToggle,
    OperationType::MasterFailover,
    OperationType::SyncMasterAddresses,
    OperationType::PauseUniverse,
    OperationType::ResumeUniverse,
    OperationType::PauseXClusterUniverses,
    OperationType::ResumeXClusterUniverses,
    OperationType::DecommissionNode,
];

/// (b) Operations allowed on a frozen universe.
const SAFE_IF_FROZEN: &[OperationType] = &[
    OperationType::CreateBackup,
    OperationType::BackupUniverse,
    OperationType::MultiTableBackup,
    OperationType::RestoreBackup,
    OperationType::CreatePitrConfig,
    OperationType::DeletePitrConfig,
    OperationType::CreateXClusterConfig,
    OperationType::EditXClusterConfig,
    OperationType::DeleteXClusterConfig,
    OperationType::RestartXClusterConfig,
    OperationType::SyncXClusterConfig,
    OperationType::CreateDrConfig,
    OperationType::SetTablesDrConfig,
    OperationType::RestartDrConfig,
    OperationType::EditDrConfig,
    OperationType::SwitchoverDrConfig,
    OperationType::FailoverDrConfig,
    OperationType::SyncDrConfig,
    OperationType::DeleteDrConfig,
    OperationType::DestroyUniverse,
    OperationType::DestroyKubernetesUniverse,
    OperationType::ReinstallNodeAgent,
    OperationType::CreateSupportBundle,
    OperationType::CreateBackupSchedule,
    OperationType::CreateBackupScheduleKubernetes,
    OperationType::EditBackupSchedule,
    OperationType::EditBackupScheduleKubernetes,
    OperationType::DeleteBackupSchedule,
    OperationType::DeleteBackupScheduleKubernetes,
    OperationType::EnableNodeAgentInUniverse,
];

/// (c) Placement modifications whose partial failure leaves the universe in a
/// state that can be re-run.
const RERUNNABLE: &[OperationType] = &[
    OperationType::GFlagsUpgrade,
    OperationType::RestartUniverse,
    OperationType::VMImageUpgrade,
    OperationType::GFlagsKubernetesUpgrade,
    OperationType::KubernetesOverridesUpgrade,
    // only resource spec changes are re-runnable; callers narrow this further
    OperationType::EditKubernetesUniverse,
    OperationType::PauseUniverse,
    OperationType::ResumeUniverse,
    OperationType::PauseXClusterUniverses,
    OperationType::ResumeXClusterUniverses,
];

/// (d) Operations that run without reconciling in-memory and persisted topology first.
const SKIP_CONSISTENCY_CHECK: &[OperationType] = &[
    OperationType::CreateBackup,
    OperationType::CreateBackupSchedule,
    OperationType::CreateBackupScheduleKubernetes,
    OperationType::CreateKubernetesUniverse,
    OperationType::CreateSupportBundle,
    OperationType::CreateUniverse,
    OperationType::BackupUniverse,
    OperationType::DeleteBackupSchedule,
    OperationType::DeleteBackupScheduleKubernetes,
    OperationType::DeleteDrConfig,
    OperationType::DeletePitrConfig,
    OperationType::DeleteXClusterConfig,
    OperationType::DestroyUniverse,
    OperationType::DestroyKubernetesUniverse,
    OperationType::EditBackupSchedule,
    OperationType::EditBackupScheduleKubernetes,
    OperationType::MultiTableBackup,
    OperationType::ResumeKubernetesUniverse,
    OperationType::ReadOnlyClusterDelete,
    OperationType::FailoverDrConfig,
    OperationType::ResumeUniverse,
];

impl OperationType {
    pub fn is_placement_modification(self) -> bool {
        PLACEMENT_MODIFICATION.contains(&self)
    }

    pub fn is_safe_if_frozen(self) -> bool {
        SAFE_IF_FROZEN.contains(&self)
    }

    pub fn is_rerunnable(self) -> bool {
        RERUNNABLE.contains(&self)
    }

    pub fn skips_consistency_check(self) -> bool {
        SKIP_CONSISTENCY_CHECK.contains(&self)
    }

    /// Operations admitted on a frozen universe regardless of which task froze it.
    pub fn safe_if_frozen() -> &'static [OperationType] {
        SAFE_IF_FROZEN
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation type: {0}")]
pub struct UnknownOperation(pub String);

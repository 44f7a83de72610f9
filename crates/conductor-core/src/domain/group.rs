use serde::{Deserialize, Serialize};
use std::fmt;

/// Display tag for a batch of subtasks. Only used for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubTaskGroupType {
    Invalid,
    Configuring,
    Provisioning,
    InstallingSoftware,
    ConfigureUniverse,
    StartingNodeProcesses,
    StoppingNodeProcesses,
    RemovingUnusedServers,
    WaitForDataMigration,
    UpgradingSoftware,
    UpdatingGFlags,
    RotatingCert,
    RebootingNode,
    ResizingDisk,
    ConfigureXCluster,
    CreatingBackup,
    DeletingNode,
}

impl SubTaskGroupType {
    pub fn as_str(self) -> &'static str {
        match self {
            SubTaskGroupType::Invalid => "Invalid",
            SubTaskGroupType::Configuring => "Configuring",
            SubTaskGroupType::Provisioning => "Provisioning",
            SubTaskGroupType::InstallingSoftware => "InstallingSoftware",
            SubTaskGroupType::ConfigureUniverse => "ConfigureUniverse",
            SubTaskGroupType::StartingNodeProcesses => "StartingNodeProcesses",
            SubTaskGroupType::StoppingNodeProcesses => "StoppingNodeProcesses",
            SubTaskGroupType::RemovingUnusedServers => "RemovingUnusedServers",
            SubTaskGroupType::WaitForDataMigration => "WaitForDataMigration",
            SubTaskGroupType::UpgradingSoftware => "UpgradingSoftware",
            SubTaskGroupType::UpdatingGFlags => "UpdatingGFlags",
            SubTaskGroupType::RotatingCert => "RotatingCert",
            SubTaskGroupType::RebootingNode => "RebootingNode",
            SubTaskGroupType::ResizingDisk => "ResizingDisk",
            SubTaskGroupType::ConfigureXCluster => "ConfigureXCluster",
            SubTaskGroupType::CreatingBackup => "CreatingBackup",
            SubTaskGroupType::DeletingNode => "DeletingNode",
        }
    }
}

impl fmt::Display for SubTaskGroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

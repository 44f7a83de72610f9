//! Domain model (IDs, states, operations, records).

pub mod errors;
pub mod group;
pub mod ids;
pub mod node;
pub mod operation;
pub mod state;
pub mod task;
pub mod universe;

pub use errors::ErrorKind;
pub use group::SubTaskGroupType;
pub use ids::{Id, IdMarker, TaskId, UniverseId};
pub use node::{NodeActionType, NodeState};
pub use operation::{OperationType, UnknownOperation};
pub use state::TaskState;
pub use task::{ROOT_POSITION, TaskInfo, TaskType};
pub use universe::AdmissionRecord;

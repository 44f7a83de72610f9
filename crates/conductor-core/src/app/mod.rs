//! App - the engine built on top of the ports.
//!
//! - **ExecutorBuilder**: wiring and start-up validation
//! - **TaskExecutor**: bounded pool, registry, abort and shutdown
//! - **RunnableTask**: a root task with its queue of subtask groups
//! - **AdmissionPolicy**: which operations a universe accepts right now
//! - **status**: rolled-up views of persisted task trees

pub mod admission;
pub mod builder;
pub mod context;
pub mod executor;
pub mod handler;
pub mod recovery;
pub mod runnable;
pub mod status;

pub use self::admission::{AdmissionPolicy, AllowedTasks};
pub use self::builder::{BuildError, ExecutorBuilder};
pub use self::context::{ExecutionContext, TaskContext};
pub use self::executor::{ShutdownReport, TaskExecutor};
pub use self::handler::{SubTasksOnly, TaskHandler};
pub use self::recovery::RecoveryReport;
pub use self::runnable::{RunnableTask, SubTaskGroup};
pub use self::status::{GroupProgress, TaskStatus, TaskTree};

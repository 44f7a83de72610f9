//! Task bodies.
//!
//! A root task and each of its subtasks is a `TaskHandler`. The executor owns
//! state persistence; a handler only does the work and reports `Ok` or `Err`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;

use super::context::TaskContext;
use crate::domain::TaskType;
use crate::error::ConductorError;

/// Body of a task.
///
/// # Example
/// ```ignore
/// struct StopServer { node: String }
///
/// #[async_trait]
/// impl TaskHandler for StopServer {
///     fn task_type(&self) -> TaskType { TaskType::new("AnsibleClusterServerCtl") }
///
///     async fn run(&self, ctx: TaskContext) -> Result<(), ConductorError> {
///         ctx.check_abort()?;
///         // ...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn task_type(&self) -> TaskType;

    /// Parameters persisted with the task row. Opaque to the executor.
    fn params(&self) -> serde_json::Value {
        serde_json::Value::Object(Default::default())
    }

    async fn run(&self, ctx: TaskContext) -> Result<(), ConductorError>;
}

/// Root body that does nothing itself; the groups queued on the task are run
/// after it returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubTasksOnly;

#[async_trait]
impl TaskHandler for SubTasksOnly {
    fn task_type(&self) -> TaskType {
        TaskType::new("SubTasksOnly")
    }

    async fn run(&self, _ctx: TaskContext) -> Result<(), ConductorError> {
        Ok(())
    }
}

/// Run a handler, turning a panic into `ConductorError::Fault`.
pub(crate) async fn run_handler(
    handler: Arc<dyn TaskHandler>,
    ctx: TaskContext,
) -> Result<(), ConductorError> {
    match AssertUnwindSafe(handler.run(ctx)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(ConductorError::fault(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_readable() {
        let p: Box<dyn std::any::Any + Send> = Box::new("oops");
        assert_eq!(panic_message(p.as_ref()), "panicked: oops");
        let p: Box<dyn std::any::Any + Send> = Box::new(String::from("bad index"));
        assert_eq!(panic_message(p.as_ref()), "panicked: bad index");
        let p: Box<dyn std::any::Any + Send> = Box::new(7_u32);
        assert_eq!(panic_message(p.as_ref()), "panicked");
    }
}

//! Simulated nodes for the `run` command.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use conductor_core::domain::{NodeActionType, NodeState, SubTaskGroupType, TaskType};
use conductor_core::{ConductorError, SubTaskGroup, TaskContext, TaskHandler};
use tracing::info;

#[derive(Debug)]
pub struct Node {
    pub name: String,
    state: Mutex<NodeState>,
}

impl Node {
    pub fn live(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(NodeState::Live),
        })
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set(&self, state: NodeState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }
}

/// Moves one node through `transit` into `target`, after checking the node
/// state permits `action`.
struct NodeStep {
    node: Arc<Node>,
    action: NodeActionType,
    transit: NodeState,
    target: NodeState,
    work: Duration,
    fail: bool,
}

#[async_trait]
impl TaskHandler for NodeStep {
    fn task_type(&self) -> TaskType {
        TaskType::new(format!("{}Node", self.action))
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({ "node": self.node.name, "action": self.action })
    }

    async fn run(&self, ctx: TaskContext) -> Result<(), ConductorError> {
        self.node.state().validate(self.action)?;
        self.node.set(self.transit);
        info!(node = %self.node.name, state = %self.transit, "{}", self.action.progress_label(false));

        ctx.sleep_or_abort(self.work).await?;
        if self.fail {
            return Err(ConductorError::fault(format!("{} did not come up", self.node.name)));
        }
        self.node.set(self.target);
        info!(node = %self.node.name, state = %self.target, "{}", self.action.progress_label(true));
        Ok(())
    }
}

fn step(node: &Arc<Node>, action: NodeActionType, work: Duration, fail: bool) -> Arc<NodeStep> {
    let (transit, target) = match action {
        NodeActionType::Stop => (NodeState::Stopping, NodeState::Stopped),
        _ => (NodeState::Starting, NodeState::Live),
    };
    Arc::new(NodeStep {
        node: Arc::clone(node),
        action,
        transit,
        target,
        work,
        fail,
    })
}

/// Stop and start every node in turn, one node per group.
///
/// Picks up where an earlier failed run left each node: a node caught while
/// starting or already stopped only gets the start step.
pub fn rolling_restart(nodes: &[Arc<Node>], work: Duration, fail_node: Option<usize>) -> Vec<SubTaskGroup> {
    let mut groups = Vec::with_capacity(nodes.len() * 2);
    for (idx, node) in nodes.iter().enumerate() {
        if matches!(node.state(), NodeState::Live | NodeState::Stopping) {
            groups.push(
                SubTaskGroup::new(format!("stop {}", node.name), SubTaskGroupType::StoppingNodeProcesses)
                    .with_sub_task(step(node, NodeActionType::Stop, work, false)),
            );
        }
        groups.push(
            SubTaskGroup::new(format!("start {}", node.name), SubTaskGroupType::StartingNodeProcesses)
                .with_sub_task(step(node, NodeActionType::Start, work, fail_node == Some(idx))),
        );
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_plan_resumes_half_started_nodes() {
        let nodes = vec![Node::live("n1"), Node::live("n2")];
        assert_eq!(rolling_restart(&nodes, Duration::ZERO, None).len(), 4);

        nodes[1].set(NodeState::Starting);
        let plan = rolling_restart(&nodes, Duration::ZERO, None);
        let names: Vec<&str> = plan.iter().map(|g| g.name()).collect();
        assert_eq!(names, vec!["stop n1", "start n1", "start n2"]);
    }
}

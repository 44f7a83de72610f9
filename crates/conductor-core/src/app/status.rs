//! Status - read-side view of a task tree.
//!
//! The displayed state of any task is the precedence-maximum of its own state
//! and the rolled-up states of its children, recursively.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{OperationType, SubTaskGroupType, TaskId, TaskInfo, TaskState, TaskType, UniverseId};
use crate::error::ConductorError;
use crate::ports::TaskStore;

/// A task row and its loaded descendants.
#[derive(Debug, Clone)]
pub struct TaskTree {
    pub info: TaskInfo,
    pub children: Vec<TaskTree>,
}

impl TaskTree {
    pub fn leaf(info: TaskInfo) -> Self {
        Self {
            info,
            children: Vec::new(),
        }
    }

    /// Load `id` and every descendant, breadth first.
    pub async fn load(store: &dyn TaskStore, id: TaskId) -> Result<Self, ConductorError> {
        let root = store.get(id).await?.ok_or(ConductorError::TaskNotFound(id))?;

        // flat list of (row, parent index) in BFS order, then fold bottom-up
        let mut nodes: Vec<(TaskInfo, Option<usize>)> = vec![(root, None)];
        let mut queue = VecDeque::from([0usize]);
        while let Some(idx) = queue.pop_front() {
            let parent_id = nodes[idx].0.id;
            for child in store.subtasks(parent_id).await? {
                nodes.push((child, Some(idx)));
                queue.push_back(nodes.len() - 1);
            }
        }

        let mut built: Vec<Option<TaskTree>> = Vec::with_capacity(nodes.len());
        let mut children: Vec<Vec<TaskTree>> = vec![Vec::new(); nodes.len()];
        let mut parents = Vec::with_capacity(nodes.len());
        for (info, parent) in nodes {
            built.push(Some(TaskTree::leaf(info)));
            parents.push(parent);
        }
        // children always sit after their parent, so walking backwards
        // finishes every subtree before it is attached
        for idx in (0..built.len()).rev() {
            let Some(mut tree) = built[idx].take() else {
                continue;
            };
            tree.children = std::mem::take(&mut children[idx]);
            tree.children.reverse();
            match parents[idx] {
                Some(parent) => children[parent].push(tree),
                None => return Ok(tree),
            }
        }
        Err(ConductorError::TaskNotFound(id))
    }

    pub fn rolled_up_state(&self) -> TaskState {
        TaskState::roll_up(
            self.info.state,
            self.children.iter().map(TaskTree::rolled_up_state),
        )
    }
}

/// Progress of all subtasks sharing a group type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupProgress {
    pub group_type: SubTaskGroupType,
    pub state: TaskState,
    pub total: usize,
    pub completed: usize,
}

/// What a status API shows for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub operation: Option<OperationType>,
    pub universe_id: Option<UniverseId>,
    /// Rolled-up state.
    pub state: TaskState,
    pub own_state: TaskState,
    pub percent_done: u8,
    pub error: Option<String>,
    pub groups: Vec<GroupProgress>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskStatus {
    pub fn from_tree(tree: &TaskTree) -> Self {
        let mut groups: Vec<GroupProgress> = Vec::new();
        for child in &tree.children {
            let group_type = child.info.group_type.unwrap_or(SubTaskGroupType::Invalid);
            let state = child.rolled_up_state();
            let idx = match groups.iter().position(|g| g.group_type == group_type) {
                Some(idx) => idx,
                None => {
                    groups.push(GroupProgress {
                        group_type,
                        state: TaskState::Unknown,
                        total: 0,
                        completed: 0,
                    });
                    groups.len() - 1
                }
            };
            let g = &mut groups[idx];
            g.total += 1;
            if child.info.state.is_terminal() {
                g.completed += 1;
            }
            g.state = TaskState::roll_up(g.state, [state]);
        }

        // first failing leaf explains a failed root that has no detail itself
        let error = tree.info.error.clone().or_else(|| first_error(tree));

        Self {
            task_id: tree.info.id,
            task_type: tree.info.task_type.clone(),
            operation: tree.info.operation,
            universe_id: tree.info.universe_id,
            state: tree.rolled_up_state(),
            own_state: tree.info.state,
            percent_done: tree.info.percent_done,
            error,
            groups,
            created_at: tree.info.created_at,
            updated_at: tree.info.updated_at,
        }
    }
}

fn first_error(tree: &TaskTree) -> Option<String> {
    tree.children.iter().find_map(|c| {
        c.info
            .error
            .as_ref()
            .map(|e| format!("{}: {e}", c.info.task_type))
            .or_else(|| first_error(c))
    })
}

pub async fn task_status(store: &dyn TaskStore, id: TaskId) -> Result<TaskStatus, ConductorError> {
    let tree = TaskTree::load(store, id).await?;
    Ok(TaskStatus::from_tree(&tree))
}

pub async fn rolled_up_state(store: &dyn TaskStore, id: TaskId) -> Result<TaskState, ConductorError> {
    Ok(TaskTree::load(store, id).await?.rolled_up_state())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryTaskStore;
    use rand::Rng;
    use rand::seq::SliceRandom;
    use serde_json::json;

    fn info(parent: Option<TaskId>, position: i32, state: TaskState, group: SubTaskGroupType) -> TaskInfo {
        let now = Utc::now();
        let mut t = match parent {
            None => TaskInfo::root(
                TaskId::generate(),
                OperationType::SoftwareUpgrade,
                UniverseId::generate(),
                json!({}),
                "test",
                now,
            ),
            Some(p) => TaskInfo::subtask(
                TaskId::generate(),
                TaskType::new("Leaf"),
                p,
                position,
                group,
                json!({}),
                "test",
                now,
            ),
        };
        t.state = state;
        t
    }

    fn random_tree(rng: &mut impl Rng, depth: usize) -> TaskTree {
        let state = *TaskState::ALL.choose(rng).unwrap();
        let mut tree = TaskTree::leaf(info(None, -1, state, SubTaskGroupType::Invalid));
        if depth > 0 {
            for _ in 0..rng.gen_range(0..4) {
                tree.children.push(random_tree(rng, depth - 1));
            }
        }
        tree
    }

    fn max_over_tree(tree: &TaskTree) -> u8 {
        tree.children
            .iter()
            .map(max_over_tree)
            .fold(tree.info.state.precedence(), u8::max)
    }

    #[test]
    fn rolled_up_state_is_the_precedence_max_of_the_subtree() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let tree = random_tree(&mut rng, 3);
            assert_eq!(tree.rolled_up_state().precedence(), max_over_tree(&tree));
            for child in &tree.children {
                assert!(tree.rolled_up_state().precedence() >= child.rolled_up_state().precedence());
            }
        }
    }

    #[tokio::test]
    async fn load_rebuilds_nested_tree_in_position_order() {
        let store = InMemoryTaskStore::new();
        let root = info(None, -1, TaskState::Running, SubTaskGroupType::Invalid);
        store.insert(root.clone()).await.unwrap();

        let a = info(Some(root.id), 0, TaskState::Success, SubTaskGroupType::Provisioning);
        let b = info(Some(root.id), 1, TaskState::Running, SubTaskGroupType::Provisioning);
        store.insert(a.clone()).await.unwrap();
        store.insert(b.clone()).await.unwrap();
        let mut grandchild = info(Some(b.id), 0, TaskState::Failure, SubTaskGroupType::Configuring);
        grandchild.error = Some("ssh timeout".into());
        store.insert(grandchild.clone()).await.unwrap();

        let tree = TaskTree::load(&store, root.id).await.unwrap();
        let ids: Vec<TaskId> = tree.children.iter().map(|c| c.info.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
        assert_eq!(tree.children[1].children[0].info.id, grandchild.id);
        assert_eq!(tree.rolled_up_state(), TaskState::Failure);

        let status = TaskStatus::from_tree(&tree);
        assert_eq!(status.own_state, TaskState::Running);
        assert_eq!(status.state, TaskState::Failure);
        assert_eq!(status.error.as_deref(), Some("Leaf: ssh timeout"));
        assert_eq!(
            status.groups,
            vec![GroupProgress {
                group_type: SubTaskGroupType::Provisioning,
                state: TaskState::Failure,
                total: 2,
                completed: 1,
            }]
        );
    }

    #[tokio::test]
    async fn missing_root_is_not_found() {
        let store = InMemoryTaskStore::new();
        let id = TaskId::generate();
        assert!(matches!(
            task_status(&store, id).await,
            Err(ConductorError::TaskNotFound(missing)) if missing == id
        ));
    }

    #[test]
    fn groups_keep_first_appearance_order() {
        let root = info(None, -1, TaskState::Running, SubTaskGroupType::Invalid);
        let mut tree = TaskTree::leaf(root.clone());
        let order = vec![
            SubTaskGroupType::StoppingNodeProcesses,
            SubTaskGroupType::UpdatingGFlags,
            SubTaskGroupType::StartingNodeProcesses,
        ];
        for (pos, g) in order.iter().enumerate() {
            tree.children
                .push(TaskTree::leaf(info(Some(root.id), pos as i32, TaskState::Created, *g)));
        }
        let status = TaskStatus::from_tree(&tree);
        let seen: Vec<SubTaskGroupType> = status.groups.iter().map(|g| g.group_type).collect();
        assert_eq!(seen, order);
    }
}

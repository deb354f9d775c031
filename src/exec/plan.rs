//! # Execution Plans
//!
//! A query plan is a directed acyclic graph of tasks held in an arena:
//! nodes live in a flat vector and refer to each other by integer
//! [`TaskId`] handles, so parent/child references never form ownership
//! cycles and children never own parents. Acyclicity is enforced by
//! construction: a task may only name already-registered tasks as
//! parents.

use std::sync::Arc;

use eyre::{ensure, Result};
use smallvec::SmallVec;

use crate::exec::tasks::Task;

/// Handle into the plan's task arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub usize);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

pub(crate) struct PlanNode {
    pub task: Arc<dyn Task>,
    pub parents: SmallVec<[TaskId; 2]>,
    pub children: SmallVec<[TaskId; 2]>,
}

/// DAG of tasks with parent/child edges.
#[derive(Default)]
pub struct ExecutionPlan {
    nodes: Vec<PlanNode>,
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Registers a task whose parents are already in the plan.
    pub fn add_task(&mut self, task: Arc<dyn Task>, parents: &[TaskId]) -> Result<TaskId> {
        for parent in parents {
            ensure!(
                parent.0 < self.nodes.len(),
                "unknown parent task {}",
                parent
            );
        }
        let id = TaskId(self.nodes.len());
        for parent in parents {
            self.nodes[parent.0].children.push(id);
        }
        self.nodes.push(PlanNode {
            task,
            parents: parents.iter().copied().collect(),
            children: SmallVec::new(),
        });
        Ok(id)
    }

    /// A task with no inputs (column scan, kNN scan).
    pub fn add_source(&mut self, task: Arc<dyn Task>) -> TaskId {
        self.add_task(task, &[]).expect("source has no parents")
    }

    /// A task consuming exactly one parent.
    pub fn add_unary(&mut self, task: Arc<dyn Task>, parent: TaskId) -> Result<TaskId> {
        self.add_task(task, &[parent])
    }

    /// A task consuming exactly two parents.
    pub fn add_binary(&mut self, task: Arc<dyn Task>, left: TaskId, right: TaskId) -> Result<TaskId> {
        self.add_task(task, &[left, right])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn task(&self, id: TaskId) -> &Arc<dyn Task> {
        &self.nodes[id.0].task
    }

    pub fn parents(&self, id: TaskId) -> &[TaskId] {
        &self.nodes[id.0].parents
    }

    pub fn children(&self, id: TaskId) -> &[TaskId] {
        &self.nodes[id.0].children
    }

    pub(crate) fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    /// Summed fixed cost estimate across all tasks.
    pub fn total_cost(&self) -> f64 {
        self.nodes.iter().map(|n| n.task.cost()).sum()
    }

    /// The single sink task whose output is the query result.
    pub fn root(&self) -> Result<TaskId> {
        let mut roots = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.children.is_empty())
            .map(|(i, _)| TaskId(i));
        let root = roots
            .next()
            .ok_or_else(|| eyre::eyre!("empty execution plan"))?;
        ensure!(
            roots.next().is_none(),
            "execution plan has more than one sink task"
        );
        Ok(root)
    }
}

impl std::fmt::Debug for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "ExecutionPlan ({} tasks)", self.nodes.len())?;
        for (i, node) in self.nodes.iter().enumerate() {
            writeln!(
                f,
                "  {} {} parents={:?} cost={:.4}",
                TaskId(i),
                node.task.name(),
                node.parents.iter().map(|p| p.0).collect::<Vec<_>>(),
                node.task.cost()
            )?;
        }
        Ok(())
    }
}

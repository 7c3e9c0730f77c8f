//! Processing Plan
//!
//! Holds the task graph of a pipeline and rewrites it until no wildcard
//! is left in any task.
//!
//! # Structure
//!
//! - [`task`]: Task data model and ID generation
//! - [`graph`]: Arena of tasks with mutual dependency edges
//! - [`pattern`]: Locating wildcard forms in specification lists
//! - [`matcher`]: Resolving wildcard specifications against the file system
//! - [`expander`]: Expanding one task and carrying it on to its dependents

pub mod expander;
pub mod graph;
pub mod matcher;
pub mod pattern;
pub mod task;

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info};
use serde::Serialize;

use crate::error::PlanError;

pub use expander::{Expansion, TaskExpander};
pub use graph::TaskGraph;
pub use matcher::FileMatcher;
pub use pattern::Wildcard;
pub use task::{split_expansion_id, IdGenerator, Task, TaskId, TaskStatus, TaskType};

/// Serializable view of one planned task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub algorithm: String,
    pub order: Option<usize>,
    pub status: TaskStatus,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub depends_on: Vec<String>,
}

/// A processing plan: the task graph plus its execution order.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use mlplan::plan::{IdGenerator, Plan, Task, TaskType};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let ids = Arc::new(IdGenerator::new());
///     let mut plan = Plan::new(Arc::clone(&ids));
///
///     let tag = plan.add_task(
///         Task::new(ids.next_id("tag"), TaskType::Computation)
///             .with_inputs(vec!["data/*.txt".to_string()])
///             .with_outputs(vec!["tagged/*.conll".to_string()]),
///     )?;
///     let merge = plan.add_task(
///         Task::new(ids.next_id("merge"), TaskType::Manipulation)
///             .with_inputs(vec!["tagged/*.conll".to_string()])
///             .with_outputs(vec!["all.conll".to_string()]),
///     )?;
///     plan.add_dependency(merge, tag)?;
///
///     plan.expand_all()?;
///     for task in plan.tasks() {
///         println!("{}", task);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Plan {
    graph: TaskGraph,
    /// Live tasks, in topological order once sorted
    order: Vec<TaskId>,
    matcher: FileMatcher,
    ids: Arc<IdGenerator>,
}

impl Plan {
    /// Creates an empty plan resolving wildcards against the working directory.
    pub fn new(ids: Arc<IdGenerator>) -> Self {
        Self {
            graph: TaskGraph::new(),
            order: Vec::new(),
            matcher: FileMatcher::new(),
            ids,
        }
    }

    /// Sets the matcher used to resolve wildcards.
    pub fn with_matcher(mut self, matcher: FileMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// The ID generator shared by this plan.
    pub fn id_generator(&self) -> &Arc<IdGenerator> {
        &self.ids
    }

    /// Adds a task to the plan.
    pub fn add_task(&mut self, task: Task) -> Result<TaskId, PlanError> {
        if self.graph.find(task.id()).is_some() {
            return Err(PlanError::DuplicateTask(task.id().to_string()));
        }

        let id = self.graph.insert(task);
        self.order.push(id);
        Ok(id)
    }

    /// Makes `dependent` depend on `prerequisite`.
    pub fn add_dependency(&mut self, dependent: TaskId, prerequisite: TaskId) -> Result<(), PlanError> {
        self.graph.add_dependency(dependent, prerequisite)
    }

    /// Gets a task by handle.
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.graph.get(id)
    }

    /// Finds a task handle by its string ID.
    pub fn find(&self, task_id: &str) -> Option<TaskId> {
        self.graph.find(task_id)
    }

    /// Task handles in plan order.
    pub fn task_ids(&self) -> &[TaskId] {
        &self.order
    }

    /// Tasks in plan order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().map(|id| &self.graph[*id])
    }

    /// The underlying task graph.
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Sorts the plan topologically, ties kept in discovery order.
    pub fn sort(&mut self) -> Result<(), PlanError> {
        self.order = self.graph.topological_sort(&self.order)?;
        Ok(())
    }

    /// Expands one task and applies the result to the plan.
    ///
    /// The plan is left untouched if the expansion fails, including when a
    /// superseded task would leave a dependent behind
    /// ([`PlanError::DanglingDependent`]). Handles listed in
    /// [`Expansion::tasks_to_remove`] are no longer valid afterwards.
    pub fn expand(&mut self, id: TaskId) -> Result<Expansion, PlanError> {
        if !self.graph.contains(id) {
            return Err(PlanError::UnknownTask(id));
        }

        let mut scratch = self.graph.clone();
        let expansion = TaskExpander::new(&mut scratch, &self.matcher, id).expand()?;

        self.graph = scratch;
        self.apply(id, &expansion)?;
        Ok(expansion)
    }

    /// Expands tasks until no wildcard is left to resolve.
    ///
    /// Tasks are taken in topological order, so an ancestor's expansion is
    /// carried on to its dependents before they are looked at themselves.
    pub fn expand_all(&mut self) -> Result<(), PlanError> {
        info!("Expanding wildcards in plan with {} tasks", self.len());
        let original_count = self.len();

        self.sort()?;
        let mut attempted = HashSet::new();

        while let Some(id) = self.next_expandable(&attempted) {
            attempted.insert(id);
            self.expand(id)?;
        }

        info!(
            "Wildcard expansion: {} tasks -> {} tasks",
            original_count,
            self.len()
        );
        Ok(())
    }

    /// Serializable view of the plan in order.
    pub fn report(&self) -> Vec<TaskReport> {
        self.tasks()
            .map(|task| TaskReport {
                id: task.id().to_string(),
                task_type: task.task_type(),
                algorithm: task.algorithm().to_string(),
                order: task.topological_order(),
                status: task.status(),
                inputs: task.inputs().to_vec(),
                outputs: task.outputs().to_vec(),
                depends_on: task
                    .depends_on()
                    .iter()
                    .map(|pre| self.graph[*pre].id().to_string())
                    .collect(),
            })
            .collect()
    }

    /// Substitutes an expansion's new tasks for the ones it supersedes.
    fn apply(&mut self, root: TaskId, expansion: &Expansion) -> Result<(), PlanError> {
        let position = self
            .order
            .iter()
            .position(|id| *id == root)
            .unwrap_or(self.order.len());

        let removed: HashSet<TaskId> = expansion.tasks_to_remove().iter().copied().collect();
        for &old in &removed {
            self.graph.remove(old);
        }

        let mut order = Vec::with_capacity(self.order.len() + expansion.tasks_to_add().len());
        for (i, id) in self.order.iter().enumerate() {
            if i == position {
                order.extend_from_slice(expansion.tasks_to_add());
            }
            if !removed.contains(id) {
                order.push(*id);
            }
        }
        if position >= self.order.len() {
            order.extend_from_slice(expansion.tasks_to_add());
        }
        self.order = order;

        debug!(
            "Applied expansion: {} added, {} removed",
            expansion.tasks_to_add().len(),
            removed.len()
        );
        self.sort()
    }

    /// The earliest task still carrying wildcards to resolve.
    fn next_expandable(&self, attempted: &HashSet<TaskId>) -> Option<TaskId> {
        self.order.iter().copied().find(|id| {
            let task = &self.graph[*id];
            !attempted.contains(id)
                && (pattern::has_wildcards(task.inputs())
                    || task.has_output_pattern(Wildcard::Single))
        })
    }
}

//! Task Dependency Graph
//!
//! An arena of tasks addressed by [`TaskId`] handles. Dependency edges are
//! stored on both endpoints and every mutation updates both sides, so
//! `a ∈ b.depends_on` holds exactly when `b ∈ a.dependents`.

use std::collections::HashSet;
use std::ops::{Index, IndexMut};

use log::debug;

use super::task::{Substitution, Task, TaskId};
use crate::error::PlanError;

/// Arena holding every task of a plan together with its edges.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    slots: Vec<Option<Task>>,
}

impl TaskGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves a task into the arena and returns its handle.
    ///
    /// Edges carried by the task are discarded; use
    /// [`add_dependency`](Self::add_dependency) to connect it.
    pub fn insert(&mut self, mut task: Task) -> TaskId {
        task.depends_on.clear();
        task.dependents.clear();
        task.refresh_status();

        let id = TaskId(self.slots.len());
        self.slots.push(Some(task));
        id
    }

    /// Gets a task by handle.
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Returns true if the handle refers to a live task.
    pub fn contains(&self, id: TaskId) -> bool {
        self.get(id).is_some()
    }

    /// Finds a task by its string ID.
    pub fn find(&self, task_id: &str) -> Option<TaskId> {
        self.iter().find(|(_, t)| t.id() == task_id).map(|(id, _)| id)
    }

    /// Iterates over live tasks in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (TaskId, &Task)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|t| (TaskId(i), t)))
    }

    /// Number of live tasks.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes `dependent` depend on `prerequisite`.
    ///
    /// Adding an existing edge again is a no-op. Self-loops and edges that
    /// would close a cycle are rejected.
    pub fn add_dependency(&mut self, dependent: TaskId, prerequisite: TaskId) -> Result<(), PlanError> {
        let dependent_task = self.get(dependent).ok_or(PlanError::UnknownTask(dependent))?;
        if !self.contains(prerequisite) {
            return Err(PlanError::UnknownTask(prerequisite));
        }
        if dependent == prerequisite {
            return Err(PlanError::SelfDependency(dependent_task.id().to_string()));
        }
        if self.reaches(prerequisite, dependent) {
            return Err(PlanError::CyclicDependency);
        }

        self.link(dependent, prerequisite);
        Ok(())
    }

    /// Removes the edge between `dependent` and `prerequisite`, if any.
    pub fn remove_dependency(&mut self, dependent: TaskId, prerequisite: TaskId) {
        if let Some(task) = self.get_mut(dependent) {
            task.depends_on.remove(&prerequisite);
            task.refresh_status();
        }
        if let Some(task) = self.get_mut(prerequisite) {
            task.dependents.remove(&dependent);
        }
    }

    /// Severs every edge of a task, in both directions.
    pub fn detach(&mut self, id: TaskId) {
        let Some(task) = self.get(id) else {
            return;
        };
        let prerequisites: Vec<TaskId> = task.depends_on.iter().copied().collect();
        let dependents: Vec<TaskId> = task.dependents.iter().copied().collect();

        for pre in prerequisites {
            self.remove_dependency(id, pre);
        }
        for dep in dependents {
            self.remove_dependency(dep, id);
        }
    }

    /// Detaches a task and drops it from the arena.
    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        self.detach(id);
        let task = self.slots.get_mut(id.0).and_then(Option::take);
        if let Some(task) = &task {
            debug!("Removed task '{}' from the graph", task.id());
        }
        task
    }

    /// Clones `source` bound to `value` and wires the clone into every edge
    /// the source has.
    pub(crate) fn expand_task(&mut self, source: TaskId, value: &str, substitution: Substitution) -> TaskId {
        let src = &self[source];
        let clone = src.expansion(value, substitution);
        let prerequisites: Vec<TaskId> = src.depends_on.iter().copied().collect();
        let dependents: Vec<TaskId> = src.dependents.iter().copied().collect();

        let id = self.insert(clone);
        for pre in prerequisites {
            self.link(id, pre);
        }
        for dep in dependents {
            self.link(dep, id);
        }

        debug!("Created task '{}' from '{}'", self[id].id(), self[source].id());
        id
    }

    /// Assigns topological orders to the tasks listed in `discovery` and
    /// returns them sorted by that order.
    ///
    /// A task is ordered once all of its prerequisites are; among tasks that
    /// become orderable together, the one discovered first goes first.
    pub fn topological_sort(&mut self, discovery: &[TaskId]) -> Result<Vec<TaskId>, PlanError> {
        for &id in discovery {
            self.get_mut(id).ok_or(PlanError::UnknownTask(id))?.set_topological_order(None);
        }

        let mut sorted: Vec<TaskId> = Vec::with_capacity(discovery.len());
        while sorted.len() < discovery.len() {
            let mut progress = false;

            for &id in discovery {
                let task = &self[id];
                if task.topological_order().is_some() {
                    continue;
                }
                let ready = task
                    .depends_on
                    .iter()
                    .all(|pre| self.get(*pre).and_then(Task::topological_order).is_some());

                if ready {
                    self[id].set_topological_order(Some(sorted.len()));
                    sorted.push(id);
                    progress = true;
                }
            }

            if !progress {
                return Err(PlanError::CyclicDependency);
            }
        }

        debug!(
            "Topological order: {:?}",
            sorted.iter().map(|id| self[*id].id()).collect::<Vec<_>>()
        );
        Ok(sorted)
    }

    /// Adds an edge without validation. Both tasks must be live.
    fn link(&mut self, dependent: TaskId, prerequisite: TaskId) {
        let task = &mut self[dependent];
        task.depends_on.insert(prerequisite);
        task.refresh_status();
        self[prerequisite].dependents.insert(dependent);
    }

    /// Checks if `to` is reachable from `from` following `depends_on` edges.
    fn reaches(&self, from: TaskId, to: TaskId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(task) = self.get(current) {
                stack.extend(task.depends_on.iter().copied());
            }
        }
        false
    }
}

impl Index<TaskId> for TaskGraph {
    type Output = Task;

    fn index(&self, id: TaskId) -> &Task {
        self.get(id)
            .unwrap_or_else(|| panic!("task handle {} is not in the graph", id))
    }
}

impl IndexMut<TaskId> for TaskGraph {
    fn index_mut(&mut self, id: TaskId) -> &mut Task {
        self.get_mut(id)
            .unwrap_or_else(|| panic!("task handle {} is not in the graph", id))
    }
}

//! Task Data Model
//!
//! A task is one planning unit: an opaque algorithm applied to an ordered
//! list of input specifications, producing an ordered list of outputs.
//! Specifications may carry wildcards until the plan is expanded.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use super::pattern::{self, Wildcard};

/// Separates the source task ID from the expansion value in clone IDs.
pub const EXPANSION_SEPARATOR: char = '#';

/// Stable handle of a task inside a [`TaskGraph`](super::graph::TaskGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of work a task performs. Opaque to the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Computation,
    Manipulation,
    Evaluation,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskType::Computation => "computation",
            TaskType::Manipulation => "manipulation",
            TaskType::Evaluation => "evaluation",
        };
        f.write_str(name)
    }
}

/// Planning status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// No unresolved dependency
    Pending,
    /// Waiting for at least one dependency
    Waiting,
}

/// Thread-safe generator of unique task IDs.
///
/// IDs have the form `<prefix><n>` with `n` counting up from 1 across all
/// prefixes. Share one generator (e.g. through `Arc`) between everything
/// that creates tasks for the same plan.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicUsize,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh ID built from `prefix`.
    ///
    /// # Example
    /// ```
    /// use mlplan::plan::IdGenerator;
    ///
    /// let ids = IdGenerator::new();
    /// assert_eq!(ids.next_id("tag"), "tag1");
    /// assert_eq!(ids.next_id("merge"), "merge2");
    /// ```
    pub fn next_id(&self, prefix: &str) -> String {
        let n = self.last.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}{}", prefix, n)
    }
}

/// Splits an expanded task ID into the original ID and its pattern replacement.
///
/// Returns `None` for IDs of tasks that were never expanded.
///
/// # Example
/// ```
/// use mlplan::plan::split_expansion_id;
///
/// assert_eq!(split_expansion_id("tag1#doc3"), Some(("tag1", "doc3")));
/// assert_eq!(split_expansion_id("cross2#a#b"), Some(("cross2", "a#b")));
/// assert_eq!(split_expansion_id("tag1"), None);
/// ```
pub fn split_expansion_id(id: &str) -> Option<(&str, &str)> {
    id.split_once(EXPANSION_SEPARATOR)
}

/// Which input positions a clone substitutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Substitution {
    /// Every input carrying a single `*`
    Single,
    /// The one input at this position (a `***` spec)
    At(usize),
}

/// A single unit of the processing plan.
#[derive(Debug, Clone)]
pub struct Task {
    id: String,
    task_type: TaskType,
    algorithm: String,
    parameters: BTreeMap<String, String>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    status: TaskStatus,
    pub(crate) depends_on: BTreeSet<TaskId>,
    pub(crate) dependents: BTreeSet<TaskId>,
    pattern_replacement: String,
    topological_order: Option<usize>,
}

impl Task {
    /// Creates a new task with no inputs, outputs or dependencies.
    ///
    /// # Example
    ///
    /// ```
    /// use mlplan::plan::{Task, TaskType};
    ///
    /// let task = Task::new("tag1", TaskType::Computation)
    ///     .with_algorithm("Tagger")
    ///     .with_inputs(vec!["data/*.txt".to_string()])
    ///     .with_outputs(vec!["tagged/*.conll".to_string()]);
    /// assert!(task.has_wildcards());
    /// ```
    pub fn new(id: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            id: id.into().trim().to_string(),
            task_type,
            algorithm: String::new(),
            parameters: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            status: TaskStatus::Pending,
            depends_on: BTreeSet::new(),
            dependents: BTreeSet::new(),
            pattern_replacement: String::new(),
            topological_order: None,
        }
    }

    /// Sets the algorithm name.
    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = algorithm.into();
        self
    }

    /// Adds one algorithm parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Sets the input specifications.
    pub fn with_inputs(mut self, inputs: Vec<String>) -> Self {
        self.inputs = inputs;
        self
    }

    /// Sets the output specifications.
    pub fn with_outputs(mut self, outputs: Vec<String>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Tasks this one depends on.
    pub fn depends_on(&self) -> &BTreeSet<TaskId> {
        &self.depends_on
    }

    /// Tasks depending on this one.
    pub fn dependents(&self) -> &BTreeSet<TaskId> {
        &self.dependents
    }

    /// The value this task was expanded with, empty for unexpanded tasks.
    pub fn pattern_replacement(&self) -> &str {
        &self.pattern_replacement
    }

    /// Returns true if this task is a clone created by expansion.
    pub fn is_expansion(&self) -> bool {
        !self.pattern_replacement.is_empty()
    }

    /// Position in the topological order, `None` until the plan is sorted.
    pub fn topological_order(&self) -> Option<usize> {
        self.topological_order
    }

    /// Checks if any input or output still carries a wildcard character.
    pub fn has_wildcards(&self) -> bool {
        pattern::has_wildcards(&self.inputs) || pattern::has_wildcards(&self.outputs)
    }

    /// Checks if any input carries the given wildcard form.
    pub fn has_input_pattern(&self, wildcard: Wildcard) -> bool {
        pattern::contains(wildcard, &self.inputs)
    }

    /// Checks if any output carries the given wildcard form.
    pub fn has_output_pattern(&self, wildcard: Wildcard) -> bool {
        pattern::contains(wildcard, &self.outputs)
    }

    pub(crate) fn set_topological_order(&mut self, order: Option<usize>) {
        self.topological_order = order;
    }

    pub(crate) fn refresh_status(&mut self) {
        self.status = if self.depends_on.is_empty() {
            TaskStatus::Pending
        } else {
            TaskStatus::Waiting
        };
    }

    /// Replaces the input at `pos` with a list of inputs, keeping order.
    pub(crate) fn replace_input(&mut self, pos: usize, replacement: Vec<String>) {
        self.inputs.splice(pos..=pos, replacement);
    }

    pub(crate) fn outputs_mut(&mut self) -> &mut Vec<String> {
        &mut self.outputs
    }

    /// Builds an edge-less copy of this task bound to `value`.
    ///
    /// The clone's ID is `<id>#<value>`; its pattern replacement accumulates
    /// onto any replacement this task already carries, so splitting the ID at
    /// the first separator always yields the original ID and the replacement.
    pub(crate) fn expansion(&self, value: &str, substitution: Substitution) -> Task {
        let mut inputs = self.inputs.clone();
        match substitution {
            Substitution::Single => {
                for spec in inputs.iter_mut().filter(|s| Wildcard::Single.is_in(s)) {
                    *spec = pattern::substitute(spec, value);
                }
            }
            Substitution::At(pos) => {
                if let Some(spec) = inputs.get_mut(pos) {
                    *spec = pattern::substitute(spec, value);
                }
            }
        }

        let pattern_replacement = if self.pattern_replacement.is_empty() {
            value.to_string()
        } else {
            format!("{}{}{}", self.pattern_replacement, EXPANSION_SEPARATOR, value)
        };

        Task {
            id: format!("{}{}{}", self.id, EXPANSION_SEPARATOR, value),
            task_type: self.task_type,
            algorithm: self.algorithm.clone(),
            parameters: self.parameters.clone(),
            inputs,
            outputs: self.outputs.clone(),
            status: TaskStatus::Pending,
            depends_on: BTreeSet::new(),
            dependents: BTreeSet::new(),
            pattern_replacement,
            topological_order: self.topological_order,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): [{}] -> [{}]",
            self.id,
            self.task_type,
            self.inputs.join(", "),
            self.outputs.join(", ")
        )
    }
}

//! Wildcard Expansion
//!
//! Rewrites one task carrying wildcards into concrete tasks, and carries
//! the expansion on to the tasks depending on it.
//!
//! Input forms (one per specification string):
//! - `*`   one clone per matched value; outputs and dependents follow along
//! - `**`  the input is replaced in place by every matching file
//! - `***` one clone per combination of matched values over all `***` inputs
//!
//! Outputs may carry `*` (rewritten with each clone's value) or `**` (left to
//! the task itself, which decides its outputs at run time).

use std::collections::{HashMap, HashSet};

use log::{debug, info};

use super::graph::TaskGraph;
use super::matcher::FileMatcher;
use super::pattern::{self, Wildcard, WILDCARD_CHAR};
use super::task::{split_expansion_id, Substitution, TaskId};
use crate::error::ExpansionError;

/// Outcome of expanding one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    to_add: Vec<TaskId>,
    to_remove: Vec<TaskId>,
}

impl Expansion {
    /// New tasks, in the topological order of the tasks they replace.
    pub fn tasks_to_add(&self) -> &[TaskId] {
        &self.to_add
    }

    /// Superseded tasks; already detached from all edges.
    pub fn tasks_to_remove(&self) -> &[TaskId] {
        &self.to_remove
    }

    /// Returns true if the expansion neither adds nor removes tasks.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Positions of every wildcard form in one task's inputs and outputs.
#[derive(Debug, Default)]
struct Forms {
    input_single: Option<Vec<usize>>,
    input_flatten: Option<Vec<usize>>,
    input_cartesian: Option<Vec<usize>>,
    output_single: Option<Vec<usize>>,
    output_flatten: Option<Vec<usize>>,
}

/// Clones created for each superseded task, in the order they were made.
///
/// A retained original is one that still has unexpanded sibling producers;
/// it stays in the plan so their expansion can reach it later.
#[derive(Debug, Default)]
struct ExpansionSets {
    originals: Vec<TaskId>,
    clones: HashMap<TaskId, Vec<TaskId>>,
    retained: HashSet<TaskId>,
}

impl ExpansionSets {
    fn contains(&self, original: TaskId) -> bool {
        self.clones.contains_key(&original)
    }

    fn get(&self, original: TaskId) -> &[TaskId] {
        self.clones.get(&original).map(Vec::as_slice).unwrap_or(&[])
    }

    fn push(&mut self, original: TaskId, clone: TaskId) {
        if !self.originals.contains(&original) {
            self.originals.push(original);
        }
        self.clones.entry(original).or_default().push(clone);
    }

    fn take(&mut self, original: TaskId) -> Option<Vec<TaskId>> {
        self.clones.remove(&original)
    }

    fn all_clones(&self) -> HashSet<TaskId> {
        self.clones.values().flatten().copied().collect()
    }

    fn retain(&mut self, original: TaskId) {
        self.retained.insert(original);
    }

    fn is_retained(&self, original: TaskId) -> bool {
        self.retained.contains(&original)
    }
}

/// Expands the wildcards of a single task within a graph.
///
/// The expander edits the graph in place: clones are inserted and wired up,
/// and superseded tasks are detached but left in the arena for the caller
/// to drop (see [`Expansion::tasks_to_remove`]).
pub struct TaskExpander<'a> {
    graph: &'a mut TaskGraph,
    matcher: &'a FileMatcher,
    task: TaskId,
    expansions: ExpansionSets,
}

impl<'a> TaskExpander<'a> {
    pub fn new(graph: &'a mut TaskGraph, matcher: &'a FileMatcher, task: TaskId) -> Self {
        Self {
            graph,
            matcher,
            task,
            expansions: ExpansionSets::default(),
        }
    }

    /// Runs the expansion.
    ///
    /// Fails with `PatternSpec` on an unsupported combination of wildcards
    /// and with `NoMatch` when a pattern resolves to nothing. On failure the
    /// graph may be partially rewritten and must be discarded.
    pub fn expand(mut self) -> Result<Expansion, ExpansionError> {
        let forms = self.classify(self.task)?;

        if forms.input_single.is_none() && forms.input_cartesian.is_none() {
            if forms.output_single.is_some() {
                return Err(self.spec_error("no '*' patterns in inputs but some in outputs"));
            }
            if let Some(positions) = &forms.input_flatten {
                self.expand_flatten(positions)?;
            }
            return Ok(Expansion::default());
        }

        if forms.input_flatten.is_some() {
            return Err(self.spec_error("'**' patterns cannot be combined with other patterns"));
        }
        self.check_outputs(&forms)?;

        if let Some(positions) = &forms.input_single {
            self.expand_single(positions[0])?;
        }
        if let Some(positions) = &forms.input_cartesian {
            self.expand_cartesian(positions)?;
        }

        // "**" outputs are decided by the task at run time, so the
        // expansion cannot be carried any further
        if forms.output_flatten.is_none() {
            self.expand_outputs_and_dependents(self.task)?;
        }

        self.sweep_cross_edges();
        self.finish()
    }

    /// Locates all wildcard forms of a task and rejects stray wildcards.
    fn classify(&self, id: TaskId) -> Result<Forms, ExpansionError> {
        let task = &self.graph[id];
        let inputs = task.inputs();
        let outputs = task.outputs();

        let forms = Forms {
            input_single: pattern::locate(Wildcard::Single, inputs),
            input_flatten: pattern::locate(Wildcard::Flatten, inputs),
            input_cartesian: pattern::locate(Wildcard::Cartesian, inputs),
            output_single: pattern::locate(Wildcard::Single, outputs),
            output_flatten: pattern::locate(Wildcard::Flatten, outputs),
        };

        let is_form = |spec: &str, wildcards: &[Wildcard]| {
            !spec.contains(WILDCARD_CHAR) || wildcards.iter().any(|w| w.is_in(spec))
        };
        let input_forms: &[Wildcard] = &[Wildcard::Single, Wildcard::Flatten, Wildcard::Cartesian];
        let output_forms: &[Wildcard] = &[Wildcard::Single, Wildcard::Flatten];

        if let Some(spec) = inputs.iter().find(|s| !is_form(s.as_str(), input_forms)) {
            return Err(ExpansionError::pattern_spec(
                task.id(),
                format!("unsupported wildcard usage in input '{}'", spec),
            ));
        }
        if let Some(spec) = outputs.iter().find(|s| !is_form(s.as_str(), output_forms)) {
            return Err(ExpansionError::pattern_spec(
                task.id(),
                format!("unsupported wildcard usage in output '{}'", spec),
            ));
        }

        Ok(forms)
    }

    /// All outputs must carry the same form when inputs carry `*` or `***`.
    fn check_outputs(&self, forms: &Forms) -> Result<(), ExpansionError> {
        let count = self.graph[self.task].outputs().len();
        let covers_all = |positions: &Option<Vec<usize>>| {
            positions.as_ref().is_some_and(|p| p.len() == count)
        };

        if covers_all(&forms.output_single) || covers_all(&forms.output_flatten) {
            Ok(())
        } else {
            Err(self.spec_error(
                "all outputs must have '*' or '**' patterns if inputs have '*' or '***' patterns",
            ))
        }
    }

    /// Replaces each `**` input with the full list of matching files.
    fn expand_flatten(&mut self, positions: &[usize]) -> Result<(), ExpansionError> {
        // Back to front, so earlier positions stay valid after splicing
        for &pos in positions.iter().rev() {
            let spec = self.graph[self.task].inputs()[pos].clone();
            let files = self.resolve(&spec, false)?;

            debug!(
                "Task '{}': '{}' flattened to {} files",
                self.graph[self.task].id(),
                spec,
                files.len()
            );
            self.graph[self.task].replace_input(pos, files);
        }
        Ok(())
    }

    /// Creates one clone per value matched by the `*` input at `pos`.
    fn expand_single(&mut self, pos: usize) -> Result<(), ExpansionError> {
        let spec = self.graph[self.task].inputs()[pos].clone();
        let values = self.resolve(&spec, true)?;

        for value in &values {
            let clone = self.graph.expand_task(self.task, value, Substitution::Single);
            self.expansions.push(self.task, clone);
        }

        info!(
            "Expanded task '{}' into {} tasks",
            self.graph[self.task].id(),
            values.len()
        );
        Ok(())
    }

    /// Creates one clone per combination of values over the `***` inputs.
    ///
    /// Positions are processed left to right, each one multiplying the current
    /// expansion set by its matches. The result grows as the product of all
    /// match counts, which is acceptable for the handful of wildcards a
    /// pipeline carries.
    fn expand_cartesian(&mut self, positions: &[usize]) -> Result<(), ExpansionError> {
        for &pos in positions {
            let spec = self.graph[self.task].inputs()[pos].clone();
            let values = self.resolve(&spec, true)?;

            let previous = self.expansions.take(self.task);
            let sources = previous.clone().unwrap_or_else(|| vec![self.task]);

            for source in sources {
                for value in &values {
                    let clone = self.graph.expand_task(source, value, Substitution::At(pos));
                    self.expansions.push(self.task, clone);
                }
            }

            // Intermediate clones never reach the plan
            for superseded in previous.into_iter().flatten() {
                self.graph.remove(superseded);
            }
        }

        info!(
            "Expanded task '{}' into {} combinations",
            self.graph[self.task].id(),
            self.expansions.get(self.task).len()
        );
        Ok(())
    }

    /// Rewrites the outputs of all clones of `original` and carries the
    /// expansion on to its dependents.
    fn expand_outputs_and_dependents(&mut self, original: TaskId) -> Result<(), ExpansionError> {
        self.expand_outputs(original)?;

        let dependents: Vec<TaskId> = self.graph[original].dependents().iter().copied().collect();
        for dependent in dependents {
            if !self.expansions.contains(dependent)
                && self.graph[dependent].has_input_pattern(Wildcard::Single)
            {
                self.expand_dependent(original, dependent)?;
            }
        }
        Ok(())
    }

    /// Replaces the `*` of every output of every clone with the clone's value.
    fn expand_outputs(&mut self, original: TaskId) -> Result<(), ExpansionError> {
        let task = &self.graph[original];
        let patterned = pattern::locate(Wildcard::Single, task.outputs()).map_or(0, |p| p.len());
        if patterned != task.outputs().len() {
            return Err(ExpansionError::pattern_spec(
                task.id(),
                "some outputs have '*' patterns and some don't",
            ));
        }

        for &clone in self.expansions.get(original) {
            let task = &mut self.graph[clone];
            let value = task.pattern_replacement().to_string();
            for output in task.outputs_mut().iter_mut() {
                *output = pattern::substitute(output, &value);
            }
        }
        Ok(())
    }

    /// Carries the expansion of `ancestor` on to one of its dependents.
    fn expand_dependent(&mut self, ancestor: TaskId, dependent: TaskId) -> Result<(), ExpansionError> {
        let dep = &self.graph[dependent];
        if dep.has_input_pattern(Wildcard::Flatten) {
            return Err(ExpansionError::pattern_spec(
                dep.id(),
                "'**' patterns cannot be combined with '*' patterns carried from an ancestor",
            ));
        }

        let replacements: Vec<String> = self
            .expansions
            .get(ancestor)
            .iter()
            .map(|&clone| self.graph[clone].pattern_replacement().to_string())
            .collect();
        let pending = self.pending_prerequisites(ancestor, dependent);

        // No patterned outputs: the dependent gathers all ancestor outputs
        if !dep.has_output_pattern(Wildcard::Single) && !dep.has_output_pattern(Wildcard::Flatten) {
            self.collapse_into(dependent, &replacements, !pending.is_empty());
            return Ok(());
        }

        for value in &replacements {
            let clone = self.graph.expand_task(dependent, value, Substitution::Single);
            self.clean_prerequisites(clone);
            for &pre in &pending {
                self.graph.remove_dependency(clone, pre);
            }
            self.expansions.push(dependent, clone);
        }
        if !pending.is_empty() {
            debug!(
                "Keeping '{}' for {} unexpanded producers",
                self.graph[dependent].id(),
                pending.len()
            );
            self.expansions.retain(dependent);
        }
        debug!(
            "Carried {} expansions on to dependent '{}'",
            replacements.len(),
            self.graph[dependent].id()
        );

        // "***" inputs are expanded when the dependent itself is planned
        let dep = &self.graph[dependent];
        if dep.has_output_pattern(Wildcard::Flatten) || dep.has_input_pattern(Wildcard::Cartesian) {
            return Ok(());
        }

        self.expand_outputs_and_dependents(dependent)
    }

    /// Fan-in: replaces each `*` input of `dependent` by one entry per value.
    ///
    /// With `keep_pattern` the `*` input stays after the new entries, so
    /// producers expanded later can add theirs.
    fn collapse_into(&mut self, dependent: TaskId, replacements: &[String], keep_pattern: bool) {
        let task = &mut self.graph[dependent];
        let positions = pattern::locate(Wildcard::Single, task.inputs()).unwrap_or_default();

        for &pos in positions.iter().rev() {
            let spec = task.inputs()[pos].clone();
            let mut files: Vec<String> = replacements
                .iter()
                .map(|value| pattern::substitute(&spec, value))
                .collect();
            if keep_pattern {
                files.push(spec);
            }
            task.replace_input(pos, files);
        }

        debug!(
            "Task '{}' now collects {} inputs",
            task.id(),
            task.inputs().len()
        );
    }

    /// Prerequisites of `dependent` that will expand into it in a later run.
    ///
    /// These are the retained originals of this run, and unexpanded siblings
    /// of `ancestor` (clones of the same task) whose outputs still carry `*`.
    /// Each such sibling was cloned from one task whose expansion stopped at
    /// a `***` input, and shares this dependent with `ancestor`.
    fn pending_prerequisites(&self, ancestor: TaskId, dependent: TaskId) -> Vec<TaskId> {
        let clones = self.expansions.all_clones();
        let family = base_id(self.graph[ancestor].id());

        self.graph[dependent]
            .depends_on()
            .iter()
            .copied()
            .filter(|&pre| {
                if self.expansions.is_retained(pre) {
                    return true;
                }
                let task = &self.graph[pre];
                pre != ancestor
                    && !self.expansions.contains(pre)
                    && !clones.contains(&pre)
                    && base_id(task.id()) == family
                    && task.has_output_pattern(Wildcard::Single)
            })
            .collect()
    }

    /// Drops the edges from `clone` to ancestor clones bound to another value.
    fn clean_prerequisites(&mut self, clone: TaskId) {
        let clones = self.expansions.all_clones();
        let value = self.graph[clone].pattern_replacement().to_string();

        let stale: Vec<TaskId> = self.graph[clone]
            .depends_on()
            .iter()
            .copied()
            .filter(|pre| clones.contains(pre) && self.graph[*pre].pattern_replacement() != value)
            .collect();

        for pre in stale {
            self.graph.remove_dependency(clone, pre);
        }
    }

    /// Removes edges between clones of this run bound to different values.
    ///
    /// A dependent reached through two ancestors (a diamond) is cloned while
    /// the second ancestor is still unexpanded; the second ancestor's clones
    /// then inherit edges to every clone of the dependent.
    fn sweep_cross_edges(&mut self) {
        let clones: Vec<TaskId> = self.expansions.all_clones().into_iter().collect();
        for clone in clones {
            self.clean_prerequisites(clone);
        }
    }

    /// Checks that every task outside this run that depends on a superseded
    /// task also depends on at least one of its clones.
    fn check_dependents(&self) -> Result<(), ExpansionError> {
        let clones = self.expansions.all_clones();

        for &original in &self.expansions.originals {
            if self.expansions.is_retained(original) {
                continue;
            }
            let replacements = self.expansions.get(original);
            for &dependent in self.graph[original].dependents() {
                if self.expansions.contains(dependent) || clones.contains(&dependent) {
                    continue;
                }
                let task = &self.graph[dependent];
                if !replacements.iter().any(|clone| task.depends_on().contains(clone)) {
                    return Err(ExpansionError::DanglingDependent {
                        task_id: self.graph[original].id().to_string(),
                        dependent: task.id().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Detaches all superseded tasks and collects the result.
    ///
    /// Retained originals stay in the graph, cut off from this run's clones.
    fn finish(self) -> Result<Expansion, ExpansionError> {
        self.check_dependents()?;

        let clones = self.expansions.all_clones();
        let mut to_add = Vec::new();
        let mut to_remove = Vec::new();

        for &original in &self.expansions.originals {
            if self.expansions.is_retained(original) {
                let task = &self.graph[original];
                let in_run = |id: &&TaskId| clones.contains(*id);
                let prerequisites: Vec<TaskId> = task.depends_on().iter().filter(in_run).copied().collect();
                let dependents: Vec<TaskId> = task.dependents().iter().filter(in_run).copied().collect();
                for pre in prerequisites {
                    self.graph.remove_dependency(original, pre);
                }
                for dep in dependents {
                    self.graph.remove_dependency(dep, original);
                }
            } else {
                self.graph.detach(original);
                to_remove.push(original);
            }
            to_add.extend_from_slice(self.expansions.get(original));
        }

        let graph = &*self.graph;
        to_add.sort_by_key(|id| graph[*id].topological_order().unwrap_or(usize::MAX));

        Ok(Expansion { to_add, to_remove })
    }

    fn resolve(&self, spec: &str, expansions_only: bool) -> Result<Vec<String>, ExpansionError> {
        let task_id = self.graph[self.task].id();
        self.matcher
            .resolve(spec, expansions_only)
            .map_err(|e| ExpansionError::from_match(task_id, spec, e))
    }

    fn spec_error(&self, reason: &str) -> ExpansionError {
        ExpansionError::pattern_spec(self.graph[self.task].id(), reason)
    }
}

/// The ID of the unexpanded task a clone was made from.
fn base_id(id: &str) -> &str {
    split_expansion_id(id).map_or(id, |(original, _)| original)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlanError;
    use crate::plan::task::{Task, TaskType};
    use std::fs;
    use std::path::MAIN_SEPARATOR;
    use tempfile::{tempdir, TempDir};

    /// Builds a spec under `dir` using the native separator.
    fn spec(dir: &str, file: &str) -> String {
        format!("{}{}{}", dir, MAIN_SEPARATOR, file)
    }

    fn fixture(dirs: &[(&str, &[&str])]) -> (TempDir, FileMatcher) {
        let temp = tempdir().unwrap();
        for (dir, files) in dirs {
            let path = temp.path().join(dir);
            fs::create_dir_all(&path).unwrap();
            for file in *files {
                fs::write(path.join(file), "").unwrap();
            }
        }
        let matcher = FileMatcher::with_root(temp.path());
        (temp, matcher)
    }

    fn add(graph: &mut TaskGraph, id: &str, inputs: &[String], outputs: &[String]) -> TaskId {
        graph.insert(
            Task::new(id, TaskType::Computation)
                .with_inputs(inputs.to_vec())
                .with_outputs(outputs.to_vec()),
        )
    }

    fn ids(graph: &TaskGraph, handles: &[TaskId]) -> Vec<String> {
        handles.iter().map(|h| graph[*h].id().to_string()).collect()
    }

    fn dep_ids(graph: &TaskGraph, handle: TaskId) -> Vec<String> {
        graph[handle]
            .depends_on()
            .iter()
            .map(|h| graph[*h].id().to_string())
            .collect()
    }

    #[test]
    fn test_single_star_expansion_is_deterministic() {
        let (_temp, matcher) = fixture(&[("data", &["c.txt", "a.txt", "b.txt"])]);
        let mut graph = TaskGraph::new();
        let task = add(
            &mut graph,
            "tag1",
            &[spec("data", "*.txt")],
            &[spec("out", "*.conll")],
        );

        let result = TaskExpander::new(&mut graph, &matcher, task).expand().unwrap();

        assert_eq!(ids(&graph, result.tasks_to_add()), ["tag1#a", "tag1#b", "tag1#c"]);
        assert_eq!(result.tasks_to_remove(), [task]);
        for (clone, value) in result.tasks_to_add().iter().zip(["a", "b", "c"]) {
            let clone = &graph[*clone];
            assert_eq!(clone.pattern_replacement(), value);
            assert_eq!(clone.inputs(), [spec("data", &format!("{}.txt", value))]);
            assert_eq!(clone.outputs(), [spec("out", &format!("{}.conll", value))]);
        }
    }

    #[test]
    fn test_flatten_replaces_input_in_place() {
        let (_temp, matcher) = fixture(&[("feats", &["y.arff", "x.arff"])]);
        let mut graph = TaskGraph::new();
        let task = add(
            &mut graph,
            "merge1",
            &["head.arff".to_string(), spec("feats", "**.arff")],
            &["all.arff".to_string()],
        );

        let result = TaskExpander::new(&mut graph, &matcher, task).expand().unwrap();

        assert!(result.is_empty());
        assert_eq!(
            graph[task].inputs(),
            [
                "head.arff".to_string(),
                spec("feats", "x.arff"),
                spec("feats", "y.arff")
            ]
        );
    }

    #[test]
    fn test_cartesian_cardinality() {
        let (_temp, matcher) = fixture(&[("train", &["t1", "t2", "t3"]), ("test", &["e1", "e2"])]);
        let mut graph = TaskGraph::new();
        let task = add(
            &mut graph,
            "eval1",
            &[spec("train", "***"), spec("test", "***")],
            &[spec("res", "*.txt")],
        );

        let result = TaskExpander::new(&mut graph, &matcher, task).expand().unwrap();
        let added = ids(&graph, result.tasks_to_add());

        assert_eq!(
            added,
            [
                "eval1#t1#e1",
                "eval1#t1#e2",
                "eval1#t2#e1",
                "eval1#t2#e2",
                "eval1#t3#e1",
                "eval1#t3#e2"
            ]
        );
        let first = &graph[result.tasks_to_add()[0]];
        assert_eq!(first.inputs(), [spec("train", "t1"), spec("test", "e1")]);
        assert_eq!(first.outputs(), [spec("res", "t1#e1.txt")]);
        // only the original and the six combinations remain in the arena
        assert_eq!(graph.len(), 7);
    }

    #[test]
    fn test_single_then_cartesian() {
        let (_temp, matcher) = fixture(&[("docs", &["d1.txt", "d2.txt"]), ("models", &["m1", "m2"])]);
        let mut graph = TaskGraph::new();
        let task = add(
            &mut graph,
            "apply1",
            &[spec("docs", "*.txt"), spec("models", "***")],
            &[spec("out", "*.txt")],
        );

        let result = TaskExpander::new(&mut graph, &matcher, task).expand().unwrap();

        assert_eq!(
            ids(&graph, result.tasks_to_add()),
            ["apply1#d1#m1", "apply1#d1#m2", "apply1#d2#m1", "apply1#d2#m2"]
        );
    }

    #[test]
    fn test_mixed_forms_rejected_before_file_access() {
        // The matcher root does not exist: any listing would be a NoMatch
        let matcher = FileMatcher::with_root("/nonexistent/mlplan/root");
        let mut graph = TaskGraph::new();
        let task = add(
            &mut graph,
            "bad1",
            &[spec("a", "*.txt"), spec("b", "**.txt")],
            &[spec("out", "*.txt")],
        );

        let result = TaskExpander::new(&mut graph, &matcher, task).expand();

        assert!(matches!(result, Err(ExpansionError::PatternSpec { .. })));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_no_match_fails_without_clones() {
        let (_temp, matcher) = fixture(&[("data", &["a.csv"])]);
        let mut graph = TaskGraph::new();
        let task = add(&mut graph, "tag1", &[spec("data", "*.txt")], &[spec("out", "*.txt")]);

        let result = TaskExpander::new(&mut graph, &matcher, task).expand();

        match result {
            Err(ExpansionError::NoMatch { task_id, pattern, .. }) => {
                assert_eq!(task_id, "tag1");
                assert_eq!(pattern, spec("data", "*.txt"));
            }
            other => panic!("Expected NoMatch, got {:?}", other),
        }
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_output_pattern_without_input_pattern() {
        let matcher = FileMatcher::new();
        let mut graph = TaskGraph::new();
        let task = add(&mut graph, "t1", &["in.txt".to_string()], &["out/*.txt".to_string()]);

        let result = TaskExpander::new(&mut graph, &matcher, task).expand();
        assert!(matches!(result, Err(ExpansionError::PatternSpec { .. })));
    }

    #[test]
    fn test_partially_patterned_outputs_rejected() {
        let matcher = FileMatcher::new();
        let mut graph = TaskGraph::new();
        let task = add(
            &mut graph,
            "t1",
            &["in/*.txt".to_string()],
            &["out/*.txt".to_string(), "log.txt".to_string()],
        );

        let result = TaskExpander::new(&mut graph, &matcher, task).expand();
        assert!(matches!(result, Err(ExpansionError::PatternSpec { .. })));
    }

    #[test]
    fn test_stray_wildcards_rejected() {
        let matcher = FileMatcher::new();
        let mut graph = TaskGraph::new();
        let task = add(&mut graph, "t1", &["in/a*b*c".to_string()], &[]);

        let result = TaskExpander::new(&mut graph, &matcher, task).expand();
        assert!(matches!(result, Err(ExpansionError::PatternSpec { .. })));
    }

    #[test]
    fn test_no_patterns_is_noop() {
        let matcher = FileMatcher::new();
        let mut graph = TaskGraph::new();
        let task = add(&mut graph, "t1", &["in.txt".to_string()], &["out/**".to_string()]);

        let result = TaskExpander::new(&mut graph, &matcher, task).expand().unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_dependent_edge_repair() {
        let (_temp, matcher) = fixture(&[("data", &["1.txt", "2.txt"])]);
        let mut graph = TaskGraph::new();
        let a = add(&mut graph, "A", &[spec("data", "*.txt")], &[spec("out", "*.a")]);
        let d = add(&mut graph, "D", &[spec("out", "*.a")], &[spec("out", "*.d")]);
        graph.add_dependency(d, a).unwrap();
        graph.topological_sort(&[a, d]).unwrap();

        let result = TaskExpander::new(&mut graph, &matcher, a).expand().unwrap();

        assert_eq!(ids(&graph, result.tasks_to_add()), ["A#1", "A#2", "D#1", "D#2"]);
        assert_eq!(result.tasks_to_remove(), [a, d]);

        let d1 = graph.find("D#1").unwrap();
        let d2 = graph.find("D#2").unwrap();
        assert_eq!(dep_ids(&graph, d1), ["A#1"]);
        assert_eq!(dep_ids(&graph, d2), ["A#2"]);
        assert_eq!(graph[d1].inputs(), [spec("out", "1.a")]);
        assert_eq!(graph[d2].outputs(), [spec("out", "2.d")]);

        assert!(graph[a].depends_on().is_empty() && graph[a].dependents().is_empty());
        assert!(graph[d].depends_on().is_empty() && graph[d].dependents().is_empty());
    }

    #[test]
    fn test_propagation_reaches_grandchildren() {
        let (_temp, matcher) = fixture(&[("data", &["x.txt", "y.txt"])]);
        let mut graph = TaskGraph::new();
        let a = add(&mut graph, "A", &[spec("data", "*.txt")], &[spec("s1", "*")]);
        let b = add(&mut graph, "B", &[spec("s1", "*")], &[spec("s2", "*")]);
        let c = add(&mut graph, "C", &[spec("s2", "*")], &[spec("s3", "*")]);
        graph.add_dependency(b, a).unwrap();
        graph.add_dependency(c, b).unwrap();
        graph.topological_sort(&[a, b, c]).unwrap();

        let result = TaskExpander::new(&mut graph, &matcher, a).expand().unwrap();

        assert_eq!(
            ids(&graph, result.tasks_to_add()),
            ["A#x", "A#y", "B#x", "B#y", "C#x", "C#y"]
        );
        let cy = graph.find("C#y").unwrap();
        assert_eq!(dep_ids(&graph, cy), ["B#y"]);
    }

    #[test]
    fn test_fan_in_collapse() {
        let (_temp, matcher) = fixture(&[("data", &["1.txt", "2.txt"])]);
        let mut graph = TaskGraph::new();
        let a = add(&mut graph, "A", &[spec("data", "*.txt")], &[spec("out", "*.a")]);
        let e = add(
            &mut graph,
            "E",
            &["header.txt".to_string(), spec("out", "*.a")],
            &["summary.txt".to_string()],
        );
        graph.add_dependency(e, a).unwrap();
        graph.topological_sort(&[a, e]).unwrap();

        let result = TaskExpander::new(&mut graph, &matcher, a).expand().unwrap();

        assert_eq!(ids(&graph, result.tasks_to_add()), ["A#1", "A#2"]);
        assert_eq!(result.tasks_to_remove(), [a]);
        assert_eq!(
            graph[e].inputs(),
            ["header.txt".to_string(), spec("out", "1.a"), spec("out", "2.a")]
        );
        assert_eq!(dep_ids(&graph, e), ["A#1", "A#2"]);
    }

    #[test]
    fn test_dependent_with_flatten_input_rejected() {
        let (_temp, matcher) = fixture(&[("data", &["1.txt"]), ("extra", &["e.txt"])]);
        let mut graph = TaskGraph::new();
        let a = add(&mut graph, "A", &[spec("data", "*.txt")], &[spec("out", "*.a")]);
        let d = add(
            &mut graph,
            "D",
            &[spec("out", "*.a"), spec("extra", "**.txt")],
            &[spec("out", "*.d")],
        );
        graph.add_dependency(d, a).unwrap();

        let result = TaskExpander::new(&mut graph, &matcher, a).expand();

        match result {
            Err(err @ ExpansionError::PatternSpec { .. }) => assert_eq!(err.task_id(), "D"),
            other => panic!("Expected PatternSpec, got {:?}", other),
        }
    }

    #[test]
    fn test_propagation_stops_at_cartesian_dependent() {
        let (_temp, matcher) = fixture(&[("data", &["1.txt", "2.txt"])]);
        let mut graph = TaskGraph::new();
        let a = add(&mut graph, "A", &[spec("data", "*.txt")], &[spec("out", "*.a")]);
        let d = add(
            &mut graph,
            "D",
            &[spec("out", "*.a"), spec("models", "***")],
            &[spec("res", "*.r")],
        );
        let f = add(&mut graph, "F", &[spec("res", "*.r")], &[spec("fin", "*.f")]);
        graph.add_dependency(d, a).unwrap();
        graph.add_dependency(f, d).unwrap();
        graph.topological_sort(&[a, d, f]).unwrap();

        let result = TaskExpander::new(&mut graph, &matcher, a).expand().unwrap();

        assert_eq!(ids(&graph, result.tasks_to_add()), ["A#1", "A#2", "D#1", "D#2"]);
        let d1 = &graph[graph.find("D#1").unwrap()];
        assert_eq!(d1.inputs(), [spec("out", "1.a"), spec("models", "***")]);
        // outputs wait for the Cartesian expansion of D#1 itself
        assert_eq!(d1.outputs(), [spec("res", "*.r")]);
        // F is untouched and now hangs off both clones
        assert_eq!(dep_ids(&graph, f), ["D#1", "D#2"]);
    }

    #[test]
    fn test_plain_dependent_follows_clones() {
        let (_temp, matcher) = fixture(&[("data", &["1.txt", "2.txt"])]);
        let mut graph = TaskGraph::new();
        let tag = add(&mut graph, "tag1", &[spec("data", "*.txt")], &[spec("out", "*.t")]);
        let report = add(&mut graph, "report2", &["summary.txt".to_string()], &[]);
        graph.add_dependency(report, tag).unwrap();

        let result = TaskExpander::new(&mut graph, &matcher, tag).expand().unwrap();

        assert_eq!(result.tasks_to_remove(), [tag]);
        assert_eq!(dep_ids(&graph, report), ["tag1#1", "tag1#2"]);
    }

    #[test]
    fn test_dependent_left_without_clone_is_reported() {
        let matcher = FileMatcher::new();
        let mut graph = TaskGraph::new();
        let tag = add(&mut graph, "tag1", &[spec("data", "*.txt")], &[spec("out", "*.t")]);
        let report = add(&mut graph, "report2", &["summary.txt".to_string()], &[]);
        graph.add_dependency(report, tag).unwrap();
        // a clone that never took over the edge to report2
        let clone = graph.insert(Task::new("tag1#a", TaskType::Computation));

        let mut expander = TaskExpander::new(&mut graph, &matcher, tag);
        expander.expansions.push(tag, clone);
        let err = PlanError::from(expander.finish().unwrap_err());

        match err {
            PlanError::DanglingDependent { task, dependent } => {
                assert_eq!(task, "tag1");
                assert_eq!(dependent, "report2");
            }
            other => panic!("Expected DanglingDependent, got {:?}", other),
        }
        // nothing was detached
        assert!(graph[report].depends_on().contains(&tag));
    }

    #[test]
    fn test_flatten_outputs_stop_propagation() {
        let (_temp, matcher) = fixture(&[("data", &["1.txt", "2.txt"])]);
        let mut graph = TaskGraph::new();
        let a = add(&mut graph, "A", &[spec("data", "*.txt")], &[spec("out", "**")]);
        let d = add(&mut graph, "D", &[spec("out", "*.a")], &[spec("res", "*.r")]);
        graph.add_dependency(d, a).unwrap();

        let result = TaskExpander::new(&mut graph, &matcher, a).expand().unwrap();

        assert_eq!(ids(&graph, result.tasks_to_add()), ["A#1", "A#2"]);
        assert_eq!(graph[graph.find("A#1").unwrap()].outputs(), [spec("out", "**")]);
        assert_eq!(graph[d].inputs(), [spec("out", "*.a")]);
    }

    #[test]
    fn test_diamond_keeps_branches_apart() {
        let (_temp, matcher) = fixture(&[("data", &["p.txt", "q.txt"])]);
        let mut graph = TaskGraph::new();
        let a = add(&mut graph, "A", &[spec("data", "*.txt")], &[spec("a", "*")]);
        let b = add(&mut graph, "B", &[spec("a", "*")], &[spec("b", "*")]);
        let c = add(&mut graph, "C", &[spec("a", "*")], &[spec("c", "*")]);
        let d = add(&mut graph, "D", &[spec("b", "*"), spec("c", "*")], &[spec("d", "*")]);
        graph.add_dependency(b, a).unwrap();
        graph.add_dependency(c, a).unwrap();
        graph.add_dependency(d, b).unwrap();
        graph.add_dependency(d, c).unwrap();
        graph.topological_sort(&[a, b, c, d]).unwrap();

        let result = TaskExpander::new(&mut graph, &matcher, a).expand().unwrap();

        assert_eq!(result.tasks_to_add().len(), 8);
        let dp = graph.find("D#p").unwrap();
        let dq = graph.find("D#q").unwrap();
        assert_eq!(dep_ids(&graph, dp), ["B#p", "C#p"]);
        assert_eq!(dep_ids(&graph, dq), ["B#q", "C#q"]);
        assert_eq!(graph[dp].inputs(), [spec("b", "p"), spec("c", "p")]);
    }

    #[test]
    fn test_clone_ids_round_trip() {
        let (_temp, matcher) = fixture(&[("data", &["v1.txt", "v2.txt"])]);
        let mut graph = TaskGraph::new();
        let task = add(&mut graph, "tag7", &[spec("data", "*.txt")], &[spec("out", "*")]);

        let result = TaskExpander::new(&mut graph, &matcher, task).expand().unwrap();

        for clone in result.tasks_to_add() {
            let clone = &graph[*clone];
            let (original, value) = split_expansion_id(clone.id()).unwrap();
            assert_eq!(original, "tag7");
            assert_eq!(value, clone.pattern_replacement());
            assert!(!clone.inputs().iter().any(|i| Wildcard::Single.is_in(i)));
        }
    }

    #[test]
    fn test_unrelated_prerequisites_survive() {
        let (_temp, matcher) = fixture(&[("data", &["1.txt", "2.txt"])]);
        let mut graph = TaskGraph::new();
        let setup = add(&mut graph, "setup", &[], &["model.bin".to_string()]);
        let a = add(
            &mut graph,
            "A",
            &["model.bin".to_string(), spec("data", "*.txt")],
            &[spec("out", "*")],
        );
        graph.add_dependency(a, setup).unwrap();

        let result = TaskExpander::new(&mut graph, &matcher, a).expand().unwrap();

        for clone in result.tasks_to_add() {
            assert_eq!(dep_ids(&graph, *clone), ["setup"]);
        }
        assert_eq!(graph[setup].dependents().len(), 2);
    }
}

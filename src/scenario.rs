//! Scenario Loader
//!
//! Reads a pipeline description from YAML and builds the unexpanded plan.
//! Supports both explicit dependencies (`depends_on`) and implicit ones
//! derived from input/output matching.
//!
//! # Example YAML Format
//!
//! ```yaml
//! tasks:
//!   - name: tag
//!     type: computation
//!     algorithm: Tagger
//!     params: { lang: en }
//!     input: data/*.txt
//!     output: tagged/*.conll
//!
//!   - name: merge
//!     type: manipulation
//!     algorithm: Concat
//!     input: tagged/*.conll
//!     output: all.conll
//!     depends_on:
//!       - tag
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ScenarioError;
use crate::plan::{Plan, Task, TaskId, TaskType};

/// A parsed scenario file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,
}

/// One task as written in the scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDefinition {
    /// Prefix of the generated task ID
    pub name: String,

    #[serde(rename = "type", default = "default_task_type")]
    pub task_type: TaskType,

    #[serde(default)]
    pub algorithm: String,

    #[serde(default, deserialize_with = "param_values")]
    pub params: BTreeMap<String, String>,

    #[serde(default, deserialize_with = "single_or_vec")]
    pub input: Vec<String>,

    #[serde(default, deserialize_with = "single_or_vec")]
    pub output: Vec<String>,

    /// Names of the tasks this one depends on
    #[serde(default)]
    pub depends_on: Vec<String>,
}

fn default_task_type() -> TaskType {
    TaskType::Computation
}

/// Deserializes either a single string or array of strings into Vec<String>
fn single_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::Null => Ok(Vec::new()),
        Value::String(s) if s.is_empty() => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s]),
        Value::Array(arr) => arr
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                _ => Err(de::Error::custom("Expected string in array")),
            })
            .collect(),
        _ => Err(de::Error::custom("Expected string or array of strings")),
    }
}

/// Deserializes a parameter map, rendering scalar values as strings.
fn param_values<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(name, value)| match value {
            Value::String(s) => Ok((name, s)),
            Value::Bool(_) | Value::Number(_) => Ok((name, value.to_string())),
            _ => Err(de::Error::custom(format!(
                "Parameter '{}' must be a string, number or boolean",
                name
            ))),
        })
        .collect()
}

impl Scenario {
    /// Parses a scenario from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_yaml::from_str(yaml)?;
        debug!("Parsed {} task definitions", scenario.tasks.len());
        Ok(scenario)
    }

    /// Reads and parses a scenario file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("YAML content loaded ({} bytes)", yaml.len());
        Self::from_yaml(&yaml)
    }

    /// Adds every task of the scenario to `plan` and connects them.
    ///
    /// Task IDs come from the plan's ID generator. The plan is returned
    /// sorted but not expanded.
    pub fn into_plan(self, mut plan: Plan) -> Result<Plan, ScenarioError> {
        let mut handles = Vec::with_capacity(self.tasks.len());
        for def in &self.tasks {
            let id = plan.id_generator().next_id(def.name.trim());
            let task = def
                .params
                .iter()
                .fold(
                    Task::new(id, def.task_type).with_algorithm(def.algorithm.as_str()),
                    |task, (name, value)| task.with_parameter(name.as_str(), value.as_str()),
                )
                .with_inputs(def.input.clone())
                .with_outputs(def.output.clone());

            handles.push(plan.add_task(task)?);
        }

        populate_dependencies(&mut plan, &self.tasks, &handles)?;
        plan.sort()?;

        info!("Loaded scenario with {} tasks", plan.len());
        Ok(plan)
    }
}

/// Loads a scenario file into `plan`.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use mlplan::plan::{IdGenerator, Plan};
/// use mlplan::scenario::load_scenario;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let plan = Plan::new(Arc::new(IdGenerator::new()));
///     let mut plan = load_scenario("pipeline.yaml", plan)?;
///     plan.expand_all()?;
///     println!("Planned {} tasks", plan.len());
///     Ok(())
/// }
/// ```
pub fn load_scenario(path: impl AsRef<Path>, plan: Plan) -> Result<Plan, ScenarioError> {
    info!("Loading scenario from: {}", path.as_ref().display());
    Scenario::from_file(path)?.into_plan(plan)
}

/// Connects the tasks of a scenario.
///
/// Supports two modes:
/// - **Explicit dependencies**: some task lists `depends_on` names
/// - **Implicit dependencies**: a task depends on the producer of any input
///   spec that is exactly another task's output spec
fn populate_dependencies(
    plan: &mut Plan,
    defs: &[TaskDefinition],
    handles: &[TaskId],
) -> Result<(), ScenarioError> {
    if defs.iter().any(|d| !d.depends_on.is_empty()) {
        info!("Using explicit dependencies from scenario definition");
        link_explicit(plan, defs, handles)
    } else {
        info!("Deriving dependencies from input/output matching");
        link_by_outputs(plan, defs, handles)
    }
}

fn link_explicit(plan: &mut Plan, defs: &[TaskDefinition], handles: &[TaskId]) -> Result<(), ScenarioError> {
    let mut by_name: HashMap<&str, Vec<TaskId>> = HashMap::new();
    for (def, &handle) in defs.iter().zip(handles) {
        by_name.entry(def.name.trim()).or_default().push(handle);
    }

    for (def, &handle) in defs.iter().zip(handles) {
        for name in &def.depends_on {
            let producers = by_name
                .get(name.trim())
                .ok_or_else(|| ScenarioError::UnknownDependency {
                    task: def.name.clone(),
                    dependency: name.clone(),
                })?;
            for &producer in producers {
                plan.add_dependency(handle, producer)?;
            }
        }
    }
    Ok(())
}

fn link_by_outputs(plan: &mut Plan, defs: &[TaskDefinition], handles: &[TaskId]) -> Result<(), ScenarioError> {
    let mut producers: HashMap<&str, TaskId> = HashMap::new();
    for (def, &handle) in defs.iter().zip(handles) {
        for output in &def.output {
            if let Some(&first) = producers.get(output.as_str()) {
                return Err(ScenarioError::DuplicateOutput {
                    output: output.clone(),
                    first: task_id(plan, first),
                    second: task_id(plan, handle),
                });
            }
            producers.insert(output.as_str(), handle);
        }
    }

    let mut links = 0;
    for (def, &handle) in defs.iter().zip(handles) {
        for input in &def.input {
            if let Some(&producer) = producers.get(input.as_str()) {
                plan.add_dependency(handle, producer)?;
                debug!(
                    "Task '{}' depends on '{}' through '{}'",
                    task_id(plan, handle),
                    task_id(plan, producer),
                    input
                );
                links += 1;
            }
        }
    }

    info!("Derived {} dependency relationships", links);
    Ok(())
}

fn task_id(plan: &Plan, handle: TaskId) -> String {
    plan.task(handle)
        .map(|t| t.id().to_string())
        .unwrap_or_else(|| handle.to_string())
}

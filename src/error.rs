//! Planner Error Types
//!
//! Every failure the planner can report, from a single directory listing
//! up to loading a whole scenario file.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::plan::TaskId;

/// Failure to resolve one wildcard specification against the file system.
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("cannot list directory '{}': {source}", .dir.display())]
    Unreadable {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no files match '{pattern}'")]
    NoMatches { pattern: String },

    #[error("wildcards are only allowed in the file name part of '{pattern}'")]
    WildcardInDirectory { pattern: String },

    #[error("'{pattern}' contains no wildcard")]
    NoWildcard { pattern: String },

    #[error("'{file}' matches '{pattern}' with an empty value")]
    EmptyCapture { pattern: String, file: String },
}

/// Failure to expand one task. Both kinds abort plan construction.
#[derive(Error, Debug)]
pub enum ExpansionError {
    #[error("Task '{task_id}': invalid pattern specification: {reason}")]
    PatternSpec { task_id: String, reason: String },

    #[error("Task '{task_id}': no files found for '{pattern}': {source}")]
    NoMatch {
        task_id: String,
        pattern: String,
        #[source]
        source: MatchError,
    },

    #[error("Task '{task_id}' cannot be replaced: '{dependent}' would lose its dependency on it")]
    DanglingDependent { task_id: String, dependent: String },
}

impl ExpansionError {
    pub(crate) fn pattern_spec(task_id: &str, reason: impl Into<String>) -> Self {
        Self::PatternSpec {
            task_id: task_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Attributes a matcher failure to the task whose spec was being resolved.
    pub(crate) fn from_match(task_id: &str, pattern: &str, err: MatchError) -> Self {
        match err {
            MatchError::WildcardInDirectory { .. }
            | MatchError::NoWildcard { .. }
            | MatchError::EmptyCapture { .. } => {
                Self::pattern_spec(task_id, err.to_string())
            }
            MatchError::Unreadable { .. } | MatchError::NoMatches { .. } => Self::NoMatch {
                task_id: task_id.to_string(),
                pattern: pattern.to_string(),
                source: err,
            },
        }
    }

    /// ID of the task that failed to expand.
    pub fn task_id(&self) -> &str {
        match self {
            Self::PatternSpec { task_id, .. }
            | Self::NoMatch { task_id, .. }
            | Self::DanglingDependent { task_id, .. } => task_id,
        }
    }
}

/// Failure while building or rewriting a plan.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error(transparent)]
    Expansion(ExpansionError),

    #[error("Task {0} is not part of the plan")]
    UnknownTask(TaskId),

    #[error("Task '{0}' already exists")]
    DuplicateTask(String),

    #[error("Task '{0}' cannot depend on itself")]
    SelfDependency(String),

    #[error("Plan contains cyclic dependencies (tasks depend on each other in a loop)")]
    CyclicDependency,

    #[error("Task '{task}' cannot be removed: '{dependent}' still depends on it")]
    DanglingDependent { task: String, dependent: String },
}

impl From<ExpansionError> for PlanError {
    fn from(err: ExpansionError) -> Self {
        match err {
            ExpansionError::DanglingDependent { task_id, dependent } => PlanError::DanglingDependent {
                task: task_id,
                dependent,
            },
            other => PlanError::Expansion(other),
        }
    }
}

/// Failure while loading a scenario file into an unexpanded plan.
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Failed to read scenario file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse scenario YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Multiple tasks produce '{output}': '{first}' and '{second}'")]
    DuplicateOutput {
        output: String,
        first: String,
        second: String,
    },

    #[error(transparent)]
    Plan(#[from] PlanError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_error_maps_to_no_match() {
        let err = ExpansionError::from_match(
            "tag1",
            "data/*.txt",
            MatchError::NoMatches {
                pattern: "data/*.txt".to_string(),
            },
        );

        assert!(matches!(err, ExpansionError::NoMatch { .. }));
        assert_eq!(err.task_id(), "tag1");
        assert!(err.to_string().contains("data/*.txt"));
    }

    #[test]
    fn test_directory_wildcard_maps_to_pattern_spec() {
        let err = ExpansionError::from_match(
            "tag1",
            "da*ta/x*.txt",
            MatchError::WildcardInDirectory {
                pattern: "da*ta/x*.txt".to_string(),
            },
        );

        assert!(matches!(err, ExpansionError::PatternSpec { .. }));
    }

    #[test]
    fn test_empty_capture_maps_to_pattern_spec() {
        let err = ExpansionError::from_match(
            "split1",
            "data/train*.arff",
            MatchError::EmptyCapture {
                pattern: "data/train*.arff".to_string(),
                file: "train.arff".to_string(),
            },
        );

        assert!(matches!(err, ExpansionError::PatternSpec { .. }));
        assert!(err.to_string().contains("train.arff"));
    }

    #[test]
    fn test_dangling_dependent_surfaces_as_plan_error() {
        let err: PlanError = ExpansionError::DanglingDependent {
            task_id: "tag1".to_string(),
            dependent: "report2".to_string(),
        }
        .into();

        match err {
            PlanError::DanglingDependent { task, dependent } => {
                assert_eq!(task, "tag1");
                assert_eq!(dependent, "report2");
            }
            other => panic!("Expected DanglingDependent, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_error_is_transparent_over_expansion() {
        let err: PlanError = ExpansionError::pattern_spec("merge3", "mixed outputs").into();
        assert_eq!(
            err.to_string(),
            "Task 'merge3': invalid pattern specification: mixed outputs"
        );
    }
}

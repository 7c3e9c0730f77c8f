//! mlplan - Wildcard Expansion for Processing Pipelines
//!
//! Turns a pipeline description whose tasks name their inputs and outputs
//! with wildcards into a concrete, topologically ordered plan. Each wildcard
//! is resolved against the files on disk, tasks are cloned once per match,
//! and the dependency graph is rewired so every clone depends only on the
//! clones that produce its inputs.
//!
//! # Architecture
//!
//! - [`plan`]: Task graph, pattern matching and the expansion engine
//! - [`scenario`]: Loading pipeline descriptions from YAML
//! - [`error`]: Error types for every layer
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mlplan::{load_scenario, FileMatcher, IdGenerator, Plan};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let plan = Plan::new(Arc::new(IdGenerator::new()))
//!         .with_matcher(FileMatcher::with_root("/data/corpus"));
//!
//!     let mut plan = load_scenario("pipeline.yaml", plan)?;
//!     plan.expand_all()?;
//!
//!     for task in plan.tasks() {
//!         println!("{}", task);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod plan;
pub mod scenario;

// Re-export commonly used types
pub use error::{ExpansionError, MatchError, PlanError, ScenarioError};
pub use plan::{FileMatcher, IdGenerator, Plan, Task, TaskId, TaskType};
pub use scenario::load_scenario;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "mlplan";

//! Workspace & pipeline resolution (C5): expands a pipeline of task
//! definitions over a workspace graph into an acyclic, filtered task graph
//! with a stable linear ordering.
//!
//! Grounded on `turborepo-lib/src/engine/{mod,builder,dot}.rs`: the
//! type-state `Engine<Building>`/`Engine<Built>` split, the `TaskNode`
//! root-anchored graph, and the dependency/persistent-task validation all
//! carry over, generalized from `turborepo-lib`'s concrete `PackageGraph`/
//! `TaskDefinition` types to this crate's own `WorkspaceGraph`/
//! `PipelineEntry`.

mod builder;
mod pipeline;
mod render;
mod task_id;
mod workspace;

pub use builder::{Built, Building, Engine, GraphBuilder, TaskNode};
pub use pipeline::{OutputMode, Pipeline, PipelineEntry};
pub use render::{render_dot, render_json, GraphJson};
pub use task_id::{DepRef, TaskId, TaskIdParseError};
pub use workspace::{Workspace, WorkspaceGraph, WorkspaceName};

/// Closed set of config-time failures, corresponding to spec.md §7's
/// `ConfigError` kind: "bad pipeline schema, unknown task, cycle,
/// persistent-with-dependents. Fatal before execution."
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("no task definition for {0}")]
    UnknownTask(String),
    #[error("unknown package {0} referenced by an explicit dependency")]
    MissingPackage(String),
    #[error("task graph references {0} but no definition was ever recorded for it")]
    MissingDefinition(String),
    #[error("task graph has a cycle at {0}")]
    Cycle(String),
    #[error("\"{task}\" is a persistent task but has dependents: {}", dependents.join(", "))]
    PersistentTaskHasDependents { task: String, dependents: Vec<String> },
}

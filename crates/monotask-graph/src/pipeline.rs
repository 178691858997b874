use std::collections::HashMap;

use monotask_hash::{EnvMode, OutputGlobs};
use monotask_path::AnchoredUnixPathBuf;
use serde::{Deserialize, Serialize};

use crate::task_id::{DepRef, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    Full,
    HashOnly,
    ErrorsOnly,
    None,
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::Full
    }
}

fn default_true() -> bool {
    true
}

/// A resolved task definition: spec.md §3's "Pipeline entry".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEntry {
    #[serde(default)]
    pub outputs: OutputGlobs,
    #[serde(default = "default_true")]
    pub cache: bool,
    #[serde(default)]
    pub depends_on: Vec<DepRef>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub pass_through_env: Option<Vec<String>>,
    #[serde(default)]
    pub dot_env: Vec<AnchoredUnixPathBuf>,
    #[serde(default)]
    pub output_mode: OutputMode,
    #[serde(default)]
    pub env_mode: EnvMode,
    #[serde(default)]
    pub persistent: bool,
}

impl Default for PipelineEntry {
    fn default() -> Self {
        Self {
            outputs: OutputGlobs::default(),
            cache: true,
            depends_on: Vec::new(),
            inputs: Vec::new(),
            env: Vec::new(),
            pass_through_env: None,
            dot_env: Vec::new(),
            output_mode: OutputMode::default(),
            env_mode: EnvMode::default(),
            persistent: false,
        }
    }
}

/// The pipeline map: plain `task` entries plus explicit `package#task`
/// overrides. Lookup order follows spec.md §4.5 step 1: "explicit entry wins
/// over plain `T`".
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    tasks: HashMap<String, PipelineEntry>,
    package_tasks: HashMap<TaskId, PipelineEntry>,
}

impl Pipeline {
    pub fn new(
        tasks: HashMap<String, PipelineEntry>,
        package_tasks: HashMap<TaskId, PipelineEntry>,
    ) -> Self {
        Self {
            tasks,
            package_tasks,
        }
    }

    /// Looks up a definition for `package#task`, preferring an explicit
    /// `package#task` entry over a plain `task` entry.
    pub fn resolve(&self, id: &TaskId) -> Option<&PipelineEntry> {
        self.package_tasks
            .get(id)
            .or_else(|| self.tasks.get(&id.task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_package_task_wins_over_plain_task() {
        let mut tasks = HashMap::new();
        tasks.insert(
            "build".to_string(),
            PipelineEntry {
                cache: true,
                ..Default::default()
            },
        );
        let mut package_tasks = HashMap::new();
        let id = TaskId::new("app".into(), "build");
        package_tasks.insert(
            id.clone(),
            PipelineEntry {
                cache: false,
                ..Default::default()
            },
        );
        let pipeline = Pipeline::new(tasks, package_tasks);

        assert!(!pipeline.resolve(&id).unwrap().cache);
        assert!(pipeline
            .resolve(&TaskId::new("lib".into(), "build"))
            .unwrap()
            .cache);
    }

    #[test]
    fn deserializes_a_minimal_entry() {
        let entry: PipelineEntry = serde_json::from_str(r#"{"dependsOn": ["^build"]}"#).unwrap();
        assert_eq!(entry.depends_on, vec![DepRef::Topological("build".to_string())]);
        assert!(entry.cache);
    }
}

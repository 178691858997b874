use std::collections::HashMap;

use monotask_graph::{Pipeline, PipelineEntry, TaskId};
use serde::Deserialize;

/// The on-disk pipeline file (spec.md §6): decoding is deliberately just
/// `serde`, with no schema validation beyond what `serde` gives for free —
/// out of scope per spec.md §1.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineFile {
    #[serde(rename = "$schema", default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub global_dependencies: Vec<String>,
    #[serde(default)]
    pub global_env: Vec<String>,
    #[serde(default)]
    pub global_dot_env: Vec<String>,
    #[serde(default)]
    pub global_pass_through_env: Vec<String>,
    #[serde(default)]
    pub tasks: HashMap<String, PipelineEntry>,
}

/// The four `global*` fields of a [`PipelineFile`], carried separately from
/// `tasks` so `compute_global_hash` can fold them into the global
/// fingerprint (spec.md §4.2: global inputs participate in every task's
/// hash via the global hash, not just the task's own declared inputs).
#[derive(Debug, Clone, Default)]
pub struct GlobalInputs {
    pub dependencies: Vec<String>,
    pub env: Vec<String>,
    pub dot_env: Vec<String>,
    pub pass_through_env: Vec<String>,
}

impl PipelineFile {
    pub fn parse(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }

    pub fn global_inputs(&self) -> GlobalInputs {
        GlobalInputs {
            dependencies: self.global_dependencies.clone(),
            env: self.global_env.clone(),
            dot_env: self.global_dot_env.clone(),
            pass_through_env: self.global_pass_through_env.clone(),
        }
    }

    /// Splits `tasks` into plain (`build`) and package-qualified
    /// (`web#build`) entries and builds a [`Pipeline`] from them, matching
    /// `Pipeline::resolve`'s explicit-wins-over-plain lookup.
    pub fn into_pipeline(self) -> Pipeline {
        let mut plain = HashMap::new();
        let mut package_tasks = HashMap::new();
        for (name, entry) in self.tasks {
            match name.parse::<TaskId>() {
                Ok(id) => {
                    package_tasks.insert(id, entry);
                }
                Err(_) => {
                    plain.insert(name, entry);
                }
            }
        }
        Pipeline::new(plain, package_tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_fields_and_tasks() {
        let json = r#"{
            "$schema": "https://example.com/schema.json",
            "globalDependencies": ["tsconfig.json"],
            "globalEnv": ["NODE_ENV"],
            "tasks": {
                "build": { "dependsOn": ["^build"], "outputs": { "inclusions": ["dist/**"] } },
                "web#build": { "cache": false }
            }
        }"#;
        let file = PipelineFile::parse(json).unwrap();
        assert_eq!(file.global_dependencies, vec!["tsconfig.json"]);
        let globals = file.global_inputs();
        assert_eq!(globals.dependencies, vec!["tsconfig.json"]);
        assert_eq!(globals.env, vec!["NODE_ENV"]);
        let pipeline = file.into_pipeline();
        let plain = TaskId::new("anything".into(), "build");
        assert!(pipeline.resolve(&plain).is_some());
        let web_build = TaskId::new("web".into(), "build");
        assert!(!pipeline.resolve(&web_build).unwrap().cache);
    }
}

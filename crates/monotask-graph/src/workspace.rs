use std::collections::{HashMap, HashSet};

use monotask_path::AnchoredUnixPathBuf;
use serde::{Deserialize, Serialize};

/// A package's unique name within the workspace graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkspaceName(pub String);

impl WorkspaceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkspaceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkspaceName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One node of the immutable workspace graph: a package, its directory, its
/// declared scripts, and its direct internal dependency edges. Built once
/// per run from the external workspace resolver (out of scope here, per
/// spec.md §1); never mutated after construction.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub name: WorkspaceName,
    pub dir: AnchoredUnixPathBuf,
    pub scripts: HashMap<String, String>,
    pub internal_deps: HashSet<WorkspaceName>,
    pub external_deps_hash: String,
}

/// The workspace dependency graph: packages and their internal dependency
/// edges. Distinct from the task graph (C5's output) per spec.md §9: this
/// graph is immutable input, the task graph is derived and pruned per run.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceGraph {
    workspaces: HashMap<WorkspaceName, Workspace>,
}

impl WorkspaceGraph {
    pub fn new(workspaces: impl IntoIterator<Item = Workspace>) -> Self {
        Self {
            workspaces: workspaces.into_iter().map(|w| (w.name.clone(), w)).collect(),
        }
    }

    pub fn get(&self, name: &WorkspaceName) -> Option<&Workspace> {
        self.workspaces.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &WorkspaceName> {
        self.workspaces.keys()
    }

    pub fn contains(&self, name: &WorkspaceName) -> bool {
        self.workspaces.contains_key(name)
    }

    pub fn has_script(&self, name: &WorkspaceName, task: &str) -> bool {
        self.workspaces
            .get(name)
            .is_some_and(|w| w.scripts.contains_key(task))
    }

    /// All workspaces transitively reachable via `internal_deps`, not
    /// including `name` itself. Used to expand `^task` dep-refs (§4.5 step
    /// 2).
    pub fn transitive_internal_deps(&self, name: &WorkspaceName) -> HashSet<WorkspaceName> {
        let mut seen = HashSet::new();
        let mut stack = vec![name.clone()];
        while let Some(current) = stack.pop() {
            let Some(workspace) = self.workspaces.get(&current) else {
                continue;
            };
            for dep in &workspace.internal_deps {
                if seen.insert(dep.clone()) {
                    stack.push(dep.clone());
                }
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(name: &str, deps: &[&str]) -> Workspace {
        Workspace {
            name: name.into(),
            dir: AnchoredUnixPathBuf::new(format!("packages/{name}")).unwrap(),
            scripts: HashMap::from([("build".to_string(), "tsc".to_string())]),
            internal_deps: deps.iter().map(|d| WorkspaceName::from(*d)).collect(),
            external_deps_hash: "deadbeef".into(),
        }
    }

    #[test]
    fn transitive_internal_deps_follows_the_chain() {
        let graph = WorkspaceGraph::new([
            workspace("app", &["lib"]),
            workspace("lib", &["core"]),
            workspace("core", &[]),
        ]);
        let deps = graph.transitive_internal_deps(&"app".into());
        assert_eq!(
            deps,
            HashSet::from([WorkspaceName::from("lib"), WorkspaceName::from("core")])
        );
    }

    #[test]
    fn has_script_reflects_package_scripts() {
        let graph = WorkspaceGraph::new([workspace("app", &[])]);
        assert!(graph.has_script(&"app".into(), "build"));
        assert!(!graph.has_script(&"app".into(), "lint"));
    }
}

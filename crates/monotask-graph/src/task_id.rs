use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::workspace::WorkspaceName;

/// `package#task` — the identity of a materialized task node (spec.md §3:
/// "identity = `id`"). Displays and round-trips through `#`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TaskId {
    pub package: WorkspaceName,
    pub task: String,
}

impl TaskId {
    pub fn new(package: WorkspaceName, task: impl Into<String>) -> Self {
        Self {
            package,
            task: task.into(),
        }
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.package, self.task)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed task id: {0:?}, expected \"package#task\"")]
pub struct TaskIdParseError(String);

impl FromStr for TaskId {
    type Err = TaskIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (package, task) = s
            .split_once('#')
            .ok_or_else(|| TaskIdParseError(s.to_string()))?;
        if package.is_empty() || task.is_empty() {
            return Err(TaskIdParseError(s.to_string()));
        }
        Ok(TaskId::new(WorkspaceName::from(package), task))
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A reference to another task from `depends_on`, before it has been
/// expanded against the workspace graph. See spec.md §3's dep-ref grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepRef {
    /// `name` — same-package task.
    Same(String),
    /// `^name` — topological: the same task in each internal dependency.
    Topological(String),
    /// `package#task` — an explicit cross-package reference.
    Explicit(TaskId),
}

impl FromStr for DepRef {
    type Err = TaskIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix('^') {
            if rest.is_empty() {
                return Err(TaskIdParseError(s.to_string()));
            }
            return Ok(DepRef::Topological(rest.to_string()));
        }
        if s.contains('#') {
            return Ok(DepRef::Explicit(s.parse()?));
        }
        if s.is_empty() {
            return Err(TaskIdParseError(s.to_string()));
        }
        Ok(DepRef::Same(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for DepRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("build", DepRef::Same("build".to_string()) ; "same package")]
    #[test_case("^build", DepRef::Topological("build".to_string()) ; "topological")]
    #[test_case("lib#build", DepRef::Explicit(TaskId::new("lib".into(), "build")) ; "explicit")]
    fn parses_dep_ref(input: &str, expected: DepRef) {
        assert_eq!(input.parse::<DepRef>().unwrap(), expected);
    }

    #[test]
    fn task_id_round_trips_through_display() {
        let id = TaskId::new("app".into(), "build");
        assert_eq!(id.to_string(), "app#build");
        assert_eq!("app#build".parse::<TaskId>().unwrap(), id);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!("noseparator".parse::<TaskId>().is_err());
        assert!("#build".parse::<TaskId>().is_err());
        assert!("^".parse::<DepRef>().is_err());
    }
}

//! Environment variable maps and wildcard inclusion/exclusion filtering,
//! plus (§11 of the expanded spec) CI vendor detection used only for
//! diagnostic wording, never for fingerprints.
//!
//! Grounded on `turborepo-env/src/{lib,platform}.rs`.

mod ci;
pub mod platform;

use std::{
    collections::HashMap,
    env,
    ops::{Deref, DerefMut},
};

pub use ci::{is_ci, Vendor};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum EnvError {
    #[error("failed to parse wildcard pattern as regex: {0}")]
    Regex(#[from] regex::Error),
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct EnvironmentVariableMap(HashMap<String, String>);

pub type EnvironmentVariablePairs = Vec<String>;

#[derive(Debug, Serialize)]
pub struct BySource {
    pub explicit: EnvironmentVariableMap,
    pub matching: EnvironmentVariableMap,
}

/// `all` is the task-hash input; `by_source` is what dry-runs and summaries
/// render so a user can see why a variable ended up in the hash.
#[derive(Debug, Serialize)]
pub struct DetailedMap {
    pub all: EnvironmentVariableMap,
    pub by_source: BySource,
}

struct WildcardMaps {
    inclusions: EnvironmentVariableMap,
    exclusions: EnvironmentVariableMap,
}

impl WildcardMaps {
    fn resolve(self) -> EnvironmentVariableMap {
        let mut output = self.inclusions;
        output.difference(&self.exclusions);
        output
    }
}

impl From<HashMap<String, String>> for EnvironmentVariableMap {
    fn from(map: HashMap<String, String>) -> Self {
        EnvironmentVariableMap(map)
    }
}

impl Deref for EnvironmentVariableMap {
    type Target = HashMap<String, String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for EnvironmentVariableMap {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl EnvironmentVariableMap {
    pub fn infer() -> Self {
        EnvironmentVariableMap(env::vars().collect())
    }

    pub fn into_inner(self) -> HashMap<String, String> {
        self.0
    }

    pub fn to_hashable(&self) -> EnvironmentVariablePairs {
        let mut pairs: Vec<_> = self.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort();
        pairs
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.keys().cloned().collect();
        names.sort();
        names
    }

    /// Adds `another`'s entries into `self`, overwriting existing keys.
    pub fn union(&mut self, another: &EnvironmentVariableMap) {
        for (key, value) in &another.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Removes `self`'s entries that also appear (by key) in `another`.
    pub fn difference(&mut self, another: &EnvironmentVariableMap) {
        for key in another.0.keys() {
            self.0.remove(key);
        }
    }

    fn wildcard_map_from_wildcards(
        &self,
        patterns: &[impl AsRef<str>],
    ) -> Result<WildcardMaps, EnvError> {
        let mut output = WildcardMaps {
            inclusions: EnvironmentVariableMap::default(),
            exclusions: EnvironmentVariableMap::default(),
        };

        let mut include_patterns = Vec::new();
        let mut exclude_patterns = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            if let Some(rest) = pattern.strip_prefix('!') {
                exclude_patterns.push(wildcard_to_regex_pattern(rest));
            } else if let Some(rest) = pattern.strip_prefix("\\!") {
                include_patterns.push(wildcard_to_regex_pattern(&format!("!{rest}")));
            } else {
                include_patterns.push(wildcard_to_regex_pattern(pattern));
            }
        }

        let include_regex = Regex::new(&format!("^({})$", include_patterns.join("|")))?;
        let exclude_regex = Regex::new(&format!("^({})$", exclude_patterns.join("|")))?;

        for (key, value) in &self.0 {
            if !include_patterns.is_empty() && include_regex.is_match(key) {
                output.inclusions.insert(key.clone(), value.clone());
            }
            if !exclude_patterns.is_empty() && exclude_regex.is_match(key) {
                output.exclusions.insert(key.clone(), value.clone());
            }
        }

        Ok(output)
    }

    /// Variables matching any of `wildcard_patterns` (`!` prefix excludes),
    /// with exclusions already applied.
    pub fn from_wildcards(
        &self,
        wildcard_patterns: &[impl AsRef<str>],
    ) -> Result<EnvironmentVariableMap, EnvError> {
        if wildcard_patterns.is_empty() {
            return Ok(EnvironmentVariableMap::default());
        }
        Ok(self.wildcard_map_from_wildcards(wildcard_patterns)?.resolve())
    }

    /// Same as [`Self::from_wildcards`] but keeps inclusions/exclusions
    /// separate so a caller can let user exclusions win over inferred
    /// inclusions from another source.
    pub fn wildcard_map_from_wildcards_unresolved(
        &self,
        wildcard_patterns: &[String],
    ) -> Result<(EnvironmentVariableMap, EnvironmentVariableMap), EnvError> {
        if wildcard_patterns.is_empty() {
            return Ok((
                EnvironmentVariableMap::default(),
                EnvironmentVariableMap::default(),
            ));
        }
        let maps = self.wildcard_map_from_wildcards(wildcard_patterns)?;
        Ok((maps.inclusions, maps.exclusions))
    }
}

const WILDCARD: char = '*';
const WILDCARD_ESCAPE: char = '\\';
const REGEX_WILDCARD_SEGMENT: &str = ".*";

fn wildcard_to_regex_pattern(pattern: &str) -> String {
    let mut regex_string = Vec::new();
    let mut previous_index = 0;
    let mut previous_char: Option<char> = None;

    for (i, char) in pattern.chars().enumerate() {
        if char == WILDCARD {
            if previous_char == Some(WILDCARD_ESCAPE) {
                regex_string.push(regex::escape(&format!(
                    "{}*",
                    &pattern[previous_index..(i - 1)]
                )));
            } else {
                regex_string.push(regex::escape(&pattern[previous_index..i]));
                if regex_string.last().map(String::as_str) != Some(REGEX_WILDCARD_SEGMENT) {
                    regex_string.push(REGEX_WILDCARD_SEGMENT.to_string());
                }
            }
            previous_index = i + 1;
        }
        previous_char = Some(char);
    }
    regex_string.push(regex::escape(&pattern[previous_index..]));
    regex_string.join("")
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("LITERAL_\\*", "LITERAL_\\*" ; "literal star")]
    #[test_case("*LEADING", ".*LEADING" ; "leading star")]
    fn test_wildcard_to_regex_pattern(pattern: &str, expected: &str) {
        assert_eq!(wildcard_to_regex_pattern(pattern), expected);
    }

    #[test]
    fn from_wildcards_applies_exclusions() {
        let mut map = HashMap::new();
        map.insert("NODE_ENV".to_string(), "production".to_string());
        map.insert("NODE_DEBUG".to_string(), "1".to_string());
        let env = EnvironmentVariableMap::from(map);

        let resolved = env
            .from_wildcards(&["NODE_*".to_string(), "!NODE_DEBUG".to_string()])
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolved.contains_key("NODE_ENV"));
    }

    #[test]
    fn to_hashable_is_sorted() {
        let mut map = HashMap::new();
        map.insert("B".to_string(), "2".to_string());
        map.insert("A".to_string(), "1".to_string());
        let env = EnvironmentVariableMap::from(map);
        assert_eq!(env.to_hashable(), vec!["A=1", "B=2"]);
    }
}

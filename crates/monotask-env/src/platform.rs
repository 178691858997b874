//! Platform-environment-variable drift warning (§11 of the expanded spec).
//! Grounded on `turborepo-env/src/platform.rs`: observability only, never a
//! fingerprint input.

use crate::EnvironmentVariableMap;

const PLATFORM_ENV_KEY: &str = "MONOTASK_PLATFORM_ENV";
const PLATFORM_ENV_DISABLED_KEY: &str = "MONOTASK_PLATFORM_ENV_DISABLED";

pub struct PlatformEnv {
    keys: Vec<String>,
}

impl Default for PlatformEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformEnv {
    pub fn new() -> Self {
        let keys = std::env::var(PLATFORM_ENV_KEY)
            .unwrap_or_default()
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self { keys }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn disabled() -> bool {
        matches!(
            std::env::var(PLATFORM_ENV_DISABLED_KEY).as_deref(),
            Ok("1") | Ok("true")
        )
    }

    /// Returns the subset of configured platform keys missing from
    /// `execution_env`, or empty if the check is disabled.
    pub fn validate(&self, execution_env: &EnvironmentVariableMap) -> Vec<String> {
        if Self::disabled() {
            return vec![];
        }
        self.keys
            .iter()
            .filter(|key| !execution_env.contains_key(*key))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, env};

    use super::*;

    #[test]
    fn reports_missing_platform_keys() {
        let prior = env::var(PLATFORM_ENV_KEY).ok();
        env::set_var(PLATFORM_ENV_KEY, "VERCEL_URL,VERCEL_ENV");
        let platform = PlatformEnv::new();
        let mut map = HashMap::new();
        map.insert("VERCEL_URL".to_string(), "example.com".to_string());
        let missing = platform.validate(&EnvironmentVariableMap::from(map));
        assert_eq!(missing, vec!["VERCEL_ENV".to_string()]);
        match prior {
            Some(value) => env::set_var(PLATFORM_ENV_KEY, value),
            None => env::remove_var(PLATFORM_ENV_KEY),
        }
    }
}

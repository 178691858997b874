//! CI vendor detection, grounded on `turborepo-ci/src/{lib,vendors}.rs`.
//! Used only to decide diagnostic wording (e.g. the platform-environment
//! drift warning); never consulted by the fingerprint engine.

use std::env;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vendor {
    pub name: &'static str,
    pub constant: &'static str,
    env_var: &'static str,
}

/// A representative subset of the upstream vendor catalog (GitHub Actions,
/// Vercel, Netlify, CircleCI, Jenkins, GitLab CI, Travis) rather than the
/// full multi-hundred-entry table: detection logic is what this crate is
/// grounded on, not catalog completeness.
const VENDORS: &[Vendor] = &[
    Vendor {
        name: "GitHub Actions",
        constant: "GITHUB_ACTIONS",
        env_var: "GITHUB_ACTIONS",
    },
    Vendor {
        name: "Vercel",
        constant: "VERCEL",
        env_var: "VERCEL",
    },
    Vendor {
        name: "Netlify CI",
        constant: "NETLIFY",
        env_var: "NETLIFY",
    },
    Vendor {
        name: "CircleCI",
        constant: "CIRCLE",
        env_var: "CIRCLECI",
    },
    Vendor {
        name: "Jenkins",
        constant: "JENKINS",
        env_var: "JENKINS_URL",
    },
    Vendor {
        name: "GitLab CI",
        constant: "GITLAB",
        env_var: "GITLAB_CI",
    },
    Vendor {
        name: "Travis CI",
        constant: "TRAVIS",
        env_var: "TRAVIS",
    },
];

impl Vendor {
    pub fn get_info() -> Option<Vendor> {
        VENDORS
            .iter()
            .find(|vendor| matches!(env::var(vendor.env_var), Ok(v) if !v.is_empty()))
            .cloned()
    }

    pub fn get_constant() -> Option<&'static str> {
        Self::get_info().map(|v| v.constant)
    }
}

/// Purposefully checks for non-emptiness, not `is_err()`: an env var set to
/// the empty string should not count as CI either.
pub fn is_ci() -> bool {
    ["BUILD_ID", "CI", "CI_NAME", "CONTINUOUS_INTEGRATION", "RUN_ID"]
        .iter()
        .any(|key| !env::var(key).unwrap_or_default().is_empty())
}

#[cfg(test)]
mod tests {
    use std::env;

    use super::*;

    #[test]
    fn detects_github_actions() {
        let prior = env::var("GITHUB_ACTIONS").ok();
        env::set_var("GITHUB_ACTIONS", "true");
        assert_eq!(Vendor::get_constant(), Some("GITHUB_ACTIONS"));
        match prior {
            Some(value) => env::set_var("GITHUB_ACTIONS", value),
            None => env::remove_var("GITHUB_ACTIONS"),
        }
    }
}

//! Testing environment model
//!
//! Describes what environment a schedule entry asks for.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Requested testing environment of a schedule entry
///
/// Provisioners decide how to satisfy it. The runner itself only looks at
/// `snapshots`, which asks for tasks to be isolated from each other.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestingEnvironment {
    /// Architecture used for testing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,

    /// Compose, tree or image identification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose: Option<String>,

    /// Run each task on a freshly restored guest snapshot
    #[serde(default)]
    pub snapshots: bool,
}

impl TestingEnvironment {
    pub fn new(arch: impl Into<String>, compose: impl Into<String>) -> Self {
        Self {
            arch: Some(arch.into()),
            compose: Some(compose.into()),
            snapshots: false,
        }
    }

    pub fn with_snapshots(mut self, snapshots: bool) -> Self {
        self.snapshots = snapshots;
        self
    }

    /// Whether this environment asks for isolated task execution
    pub fn wants_isolation(&self) -> bool {
        self.snapshots
    }

    /// Field values only, for human-readable tables
    pub fn values(&self) -> String {
        [
            self.arch.as_deref().unwrap_or(""),
            self.compose.as_deref().unwrap_or(""),
            if self.snapshots { "snapshots" } else { "" },
        ]
        .iter()
        .filter(|v| !v.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// Serializes as `arch=...,compose=...,snapshots=...`, keys sorted
impl fmt::Display for TestingEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arch={},compose={},snapshots={}",
            self.arch.as_deref().unwrap_or(""),
            self.compose.as_deref().unwrap_or(""),
            self.snapshots
        )
    }
}

impl FromStr for TestingEnvironment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut env = TestingEnvironment::default();

        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                Error::Config(format!("Testing environment property '{pair}' is not key=value"))
            })?;
            let value = value.trim();

            match key.trim() {
                "arch" => env.arch = Some(value.to_string()).filter(|v| !v.is_empty()),
                "compose" => env.compose = Some(value.to_string()).filter(|v| !v.is_empty()),
                "snapshots" => {
                    env.snapshots = matches!(
                        value.to_lowercase().as_str(),
                        "1" | "true" | "yes" | "on"
                    )
                }
                other => {
                    return Err(Error::Config(format!(
                        "Testing environment does not have property '{other}'"
                    )))
                }
            }
        }

        Ok(env)
    }
}

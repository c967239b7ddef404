//! Configuration module
//!
//! Handles loading and managing configuration.

mod env;
mod schedule_file;

pub use env::{print_env_help, EnvConfig};
pub use schedule_file::{EntryDefinition, GuestDefinition, ScheduleFile};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::harness::ExecutionOutput;

/// Application configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Run schedule entries in parallel
    pub parallelize: bool,

    /// Maximum entries running at once (default: all of them)
    pub max_workers: Option<usize>,

    /// Task-set runner behavior
    pub task_set: TaskSetConfig,

    /// External harness invocation
    pub harness: HarnessConfig,

    /// Files with overall result override rules
    pub result_maps: Vec<PathBuf>,
}

impl AppConfig {
    /// Default config file location, if it exists
    pub fn find() -> Option<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("schedule-runner").join("config.yaml"))
            .filter(|path| path.exists())
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        let config: Self = if is_yaml_file(path.as_ref()) {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = if is_yaml_file(path.as_ref()) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(parallel) = env.parallel {
            self.parallelize = parallel;
        }
        if let Some(max_workers) = env.max_workers {
            self.max_workers = Some(max_workers);
        }
        if let Some(on_error_continue) = env.on_error_continue {
            self.task_set.on_error_continue = on_error_continue;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == Some(0) {
            anyhow::bail!("max_workers must be at least 1");
        }

        if self.harness.command.trim().is_empty() {
            anyhow::bail!("harness command must not be empty");
        }

        Ok(())
    }

    /// Example configuration
    pub fn example() -> Self {
        Self {
            parallelize: true,
            max_workers: Some(4),
            result_maps: vec![PathBuf::from("/etc/schedule-runner/result-map.yaml")],
            ..Default::default()
        }
    }
}

/// Task-set runner configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSetConfig {
    /// Export a guest snapshot when the harness crashes
    pub on_error_snapshot: bool,

    /// Keep whatever results exist when the harness crashes
    pub on_error_continue: bool,

    /// Downgrade failures when every failing phase is benign
    pub ignore_benign_failures: bool,

    /// Phase name suffixes considered benign
    pub benign_markers: Vec<String>,

    /// Harness exit code meanings
    pub exit_codes: ExitCodes,
}

impl Default for TaskSetConfig {
    fn default() -> Self {
        Self {
            on_error_snapshot: false,
            on_error_continue: false,
            ignore_benign_failures: false,
            benign_markers: vec!["/avc".to_string()],
            exit_codes: ExitCodes::default(),
        }
    }
}

impl TaskSetConfig {
    pub fn is_benign_phase(&self, phase_name: &str) -> bool {
        self.benign_markers
            .iter()
            .any(|marker| phase_name.ends_with(marker.as_str()))
    }
}

/// How a harness exited
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitClass {
    Success,
    /// One or more tasks failed, results are valid
    TasksFailed,
    /// Watchdog timer exceeded
    Watchdog,
    /// Anything else
    Unknown(i32),
}

/// Harness exit codes, by default those of `restraint`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitCodes {
    pub task_failures: i32,
    pub watchdog: i32,
    pub generic_error: i32,

    /// Diagnostic text turning a generic error into task failures
    pub generic_failure_marker: String,
}

impl Default for ExitCodes {
    fn default() -> Self {
        Self {
            task_failures: 10,
            watchdog: 4,
            generic_error: 1,
            generic_failure_marker: "One or more tasks failed".to_string(),
        }
    }
}

impl ExitCodes {
    pub fn classify(&self, output: &ExecutionOutput) -> ExitClass {
        let code = output.exit_code;

        if code == 0 {
            ExitClass::Success
        } else if code == self.task_failures
            || (code == self.generic_error
                && !self.generic_failure_marker.is_empty()
                && output.stderr.contains(&self.generic_failure_marker))
        {
            ExitClass::TasksFailed
        } else if code == self.watchdog {
            ExitClass::Watchdog
        } else {
            ExitClass::Unknown(code)
        }
    }
}

/// External harness command configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Capability the harness provides to schedule entries
    pub capability: String,

    /// Harness executable
    pub command: String,

    /// Arguments; `{host}`, `{port}`, `{user}`, `{job}` and `{results}` are substituted
    pub args: Vec<String>,

    /// Directory holding per-invocation results directories
    pub results_root: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            capability: "restraint".to_string(),
            command: "restraint".to_string(),
            args: vec![
                "--host".to_string(),
                "1={user}@{host}:{port}".to_string(),
                "--job".to_string(),
                "{job}".to_string(),
                "--rsh".to_string(),
                "ssh".to_string(),
            ],
            results_root: PathBuf::from("results"),
        }
    }
}

fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

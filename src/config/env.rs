//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "SCHEDULE_RUNNER";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Config file from SCHEDULE_RUNNER_CONFIG
    pub config_file: Option<String>,
    /// Parallel from SCHEDULE_RUNNER_PARALLEL
    pub parallel: Option<bool>,
    /// Worker limit from SCHEDULE_RUNNER_MAX_WORKERS
    pub max_workers: Option<usize>,
    /// Log level from SCHEDULE_RUNNER_LOG
    pub log_level: Option<String>,
    /// Continue on harness crash from SCHEDULE_RUNNER_ON_ERROR_CONTINUE
    pub on_error_continue: Option<bool>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            config_file: get_env("CONFIG"),
            parallel: get_env_bool("PARALLEL"),
            max_workers: get_env_parse("MAX_WORKERS"),
            log_level: get_env("LOG"),
            on_error_continue: get_env_bool("ON_ERROR_CONTINUE"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.config_file.is_some()
            || self.parallel.is_some()
            || self.max_workers.is_some()
            || self.log_level.is_some()
            || self.on_error_continue.is_some()
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Print all SCHEDULE_RUNNER environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_CONFIG             Path to configuration file");
    println!("  {ENV_PREFIX}_PARALLEL           Run schedule entries in parallel (true/false)");
    println!("  {ENV_PREFIX}_MAX_WORKERS        Maximum entries running at once");
    println!("  {ENV_PREFIX}_LOG                Log level (trace, debug, info, warn, error)");
    println!("  {ENV_PREFIX}_ON_ERROR_CONTINUE  Keep partial results when the harness crashes");
}

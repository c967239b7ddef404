//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Test schedule runner
#[derive(Parser, Debug)]
#[command(name = "schedule-runner")]
#[command(author = "hephaex@gmail.com")]
#[command(version)]
#[command(about = "Run test schedules on remote guests through a test harness")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a test schedule
    Run(RunArgs),

    /// Check a schedule file without running it
    Validate(ValidateArgs),

    /// Show or generate configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Schedule file (YAML or JSON)
    pub schedule: PathBuf,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Run schedule entries in parallel
    #[arg(short, long)]
    pub parallel: bool,

    /// Maximum entries running at once (when parallel)
    #[arg(short = 'w', long)]
    pub max_workers: Option<usize>,

    /// Keep partial results when the harness crashes
    #[arg(long)]
    pub on_error_continue: bool,

    /// Export a guest snapshot when the harness crashes
    #[arg(long)]
    pub on_error_snapshot: bool,

    /// Downgrade task failures consisting of benign checks only
    #[arg(long)]
    pub ignore_benign_failures: bool,

    /// Result map file with overall result overrides (repeatable)
    #[arg(short = 'm', long = "result-map")]
    pub result_maps: Vec<PathBuf>,

    /// Output format (table, json, json-pretty, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Save report to file
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Arguments for validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Schedule file (YAML or JSON)
    pub schedule: PathBuf,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print an example configuration
    Example {
        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Print the effective configuration
    Show {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List supported environment variables
    Env,
}

//! Test harness boundary
//!
//! The runner never talks to a harness directly. It builds a job
//! descriptor, hands it to a [`Harness`] together with a guest, and reads
//! back results through a [`ResultParser`]. Lifecycle notifications go to
//! an [`EventSink`].

mod command;
mod events;
mod parser;

pub use command::{CommandHarness, YamlJobBuilder};
pub use events::{Event, EventSink, NullEventSink, TracingEventSink};
pub use parser::JsonResultParser;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::guest::Guest;
use crate::models::{TaskDescriptor, TaskResults};

/// Harness job description, opaque to the runner
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobDescriptor(String);

impl JobDescriptor {
    pub fn new(content: impl Into<String>) -> Self {
        Self(content.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Exit status and output streams of a harness invocation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// What a finished harness invocation left behind
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarnessOutput {
    pub execution: ExecutionOutput,
    pub results_dir: PathBuf,
}

/// A task found in a results directory
#[derive(Clone, Debug, PartialEq)]
pub struct DiscoveredTask {
    pub name: String,
    pub raw: serde_json::Value,
}

/// Builds harness job descriptors from a subset of tasks
pub trait JobDescriptorBuilder: Send + Sync {
    fn build(&self, tasks: &[TaskDescriptor]) -> Result<JobDescriptor>;
}

/// Runs a job on a guest
///
/// An `Err` means the invocation itself broke (transport, missing binary),
/// not that tests failed. A non-zero exit code is reported in
/// [`ExecutionOutput`].
#[async_trait]
pub trait Harness: Send + Sync {
    async fn execute(&self, guest: &dyn Guest, job: &JobDescriptor) -> Result<HarnessOutput>;
}

/// Reads task results left by a harness
pub trait ResultParser: Send + Sync {
    /// Tasks found in the directory, in execution order
    fn discover(&self, results_dir: &Path) -> Result<Vec<DiscoveredTask>>;

    fn parse(&self, results_dir: &Path, task: &DiscoveredTask) -> Result<TaskResults>;
}

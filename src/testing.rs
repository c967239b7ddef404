//! In-memory collaborators for unit tests

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::guest::{CommandOutput, Guest, SnapshotRef};
use crate::harness::{
    DiscoveredTask, Event, EventSink, ExecutionOutput, Harness, HarnessOutput, JobDescriptor,
    ResultParser,
};
use crate::models::TaskResults;

#[derive(Debug, Default)]
pub struct GuestCounters {
    pub created: AtomicUsize,
    pub restored: AtomicUsize,
    pub exported: AtomicUsize,
}

/// Guest that only counts snapshot operations
#[derive(Clone, Debug)]
pub struct FakeGuest {
    name: String,
    snapshots: bool,
    fail_export: bool,
    pub counters: Arc<GuestCounters>,
}

impl FakeGuest {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            snapshots: false,
            fail_export: false,
            counters: Arc::new(GuestCounters::default()),
        }
    }

    pub fn with_snapshots(mut self) -> Self {
        self.snapshots = true;
        self
    }

    pub fn failing_export(mut self) -> Self {
        self.fail_export = true;
        self
    }

    pub fn created(&self) -> usize {
        self.counters.created.load(Ordering::SeqCst)
    }

    pub fn restored(&self) -> usize {
        self.counters.restored.load(Ordering::SeqCst)
    }

    pub fn exported(&self) -> usize {
        self.counters.exported.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Guest for FakeGuest {
    fn name(&self) -> &str {
        &self.name
    }

    fn hostname(&self) -> &str {
        &self.name
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        Ok(CommandOutput {
            stdout: command.to_string(),
            ..Default::default()
        })
    }

    fn supports_snapshots(&self) -> bool {
        self.snapshots
    }

    async fn create_snapshot(&self) -> Result<SnapshotRef> {
        if !self.snapshots {
            return Err(Error::guest(&self.name, "snapshots are not supported"));
        }

        let n = self.counters.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SnapshotRef::new(format!("{}-snap-{}", self.name, n)))
    }

    async fn restore_snapshot(&self, _snapshot: &SnapshotRef) -> Result<Arc<dyn Guest>> {
        self.counters.restored.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.clone()))
    }

    async fn export_snapshot(&self, snapshot: &SnapshotRef) -> Result<PathBuf> {
        self.counters.exported.fetch_add(1, Ordering::SeqCst);

        if self.fail_export {
            return Err(Error::guest(&self.name, "export storage unavailable"));
        }
        Ok(PathBuf::from(format!("/snapshots/{snapshot}.qcow2")))
    }
}

enum Script {
    Exit {
        exit_code: i32,
        stderr: String,
        tasks: Option<Vec<(String, TaskResults)>>,
    },
    NoResults {
        exit_code: i32,
        stderr: String,
    },
    Broken(String),
}

/// Scripted harness that also parses its own "results directories"
///
/// Each `execute` consumes the next script. Without scripts left, every
/// task named in the job descriptor passes with exit code 0.
#[derive(Default)]
pub struct FakeHarness {
    scripts: Mutex<VecDeque<Script>>,
    delay: Option<Duration>,
    invocations: Mutex<Vec<(String, Vec<String>)>>,
    results: Mutex<HashMap<PathBuf, Vec<(String, TaskResults)>>>,
}

impl FakeHarness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Next invocation exits with `exit_code` leaving `tasks` behind
    pub fn then_exit(self, exit_code: i32, stderr: &str, tasks: Vec<(&str, TaskResults)>) -> Self {
        self.push(Script::Exit {
            exit_code,
            stderr: stderr.to_string(),
            tasks: Some(
                tasks
                    .into_iter()
                    .map(|(name, results)| (name.to_string(), results))
                    .collect(),
            ),
        })
    }

    /// Next invocation exits with `exit_code`, every job task passing
    pub fn then_code(self, exit_code: i32, stderr: &str) -> Self {
        self.push(Script::Exit {
            exit_code,
            stderr: stderr.to_string(),
            tasks: None,
        })
    }

    /// Next invocation exits with `exit_code` leaving no results directory
    pub fn then_no_results(self, exit_code: i32, stderr: &str) -> Self {
        self.push(Script::NoResults {
            exit_code,
            stderr: stderr.to_string(),
        })
    }

    /// Next invocation breaks before the harness runs
    pub fn then_break(self, message: &str) -> Self {
        self.push(Script::Broken(message.to_string()))
    }

    fn push(self, script: Script) -> Self {
        self.scripts.lock().unwrap().push_back(script);
        self
    }

    /// (guest name, task names) per invocation
    pub fn invocations(&self) -> Vec<(String, Vec<String>)> {
        self.invocations.lock().unwrap().clone()
    }

    fn job_tasks(job: &JobDescriptor) -> Vec<String> {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(job.as_str()).unwrap_or(serde_yaml::Value::Null);

        doc["tasks"]
            .as_sequence()
            .map(|tasks| {
                tasks
                    .iter()
                    .filter_map(|t| t["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Harness for FakeHarness {
    async fn execute(&self, guest: &dyn Guest, job: &JobDescriptor) -> Result<HarnessOutput> {
        let names = Self::job_tasks(job);
        let seq = {
            let mut invocations = self.invocations.lock().unwrap();
            invocations.push((guest.name().to_string(), names.clone()));
            invocations.len()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let results_dir = PathBuf::from(format!("{}-run-{}", guest.name(), seq));

        let script = self.scripts.lock().unwrap().pop_front();
        let (exit_code, stderr, tasks) = match script {
            Some(Script::Broken(message)) => return Err(Error::Invocation(message)),
            Some(Script::NoResults { exit_code, stderr }) => {
                return Ok(HarnessOutput {
                    execution: ExecutionOutput {
                        exit_code,
                        stdout: String::new(),
                        stderr,
                    },
                    results_dir,
                });
            }
            Some(Script::Exit {
                exit_code,
                stderr,
                tasks,
            }) => (exit_code, stderr, tasks),
            None => (0, String::new(), None),
        };

        let tasks = tasks.unwrap_or_else(|| {
            names
                .into_iter()
                .map(|name| (name, TaskResults::passed()))
                .collect()
        });

        self.results
            .lock()
            .unwrap()
            .insert(results_dir.clone(), tasks);

        Ok(HarnessOutput {
            execution: ExecutionOutput {
                exit_code,
                stdout: String::new(),
                stderr,
            },
            results_dir,
        })
    }
}

impl ResultParser for FakeHarness {
    fn discover(&self, results_dir: &Path) -> Result<Vec<DiscoveredTask>> {
        let results = self.results.lock().unwrap();
        let tasks = results
            .get(results_dir)
            .ok_or_else(|| Error::results(results_dir, "no such results directory"))?;

        Ok(tasks
            .iter()
            .enumerate()
            .map(|(index, (name, _))| DiscoveredTask {
                name: name.clone(),
                raw: json!(index),
            })
            .collect())
    }

    fn parse(&self, results_dir: &Path, task: &DiscoveredTask) -> Result<TaskResults> {
        let results = self.results.lock().unwrap();
        let index = task.raw.as_u64().unwrap() as usize;

        Ok(results[results_dir][index].1.clone())
    }
}

/// Event sink keeping everything it was given
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn payloads(&self, name: &str) -> Vec<Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.name == name)
            .map(|e| e.payload.clone())
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

//! Task-set runner
//!
//! Executes the tasks of one schedule entry on its guest through an
//! external harness. Tasks either go to the harness all at once (whole
//! mode), or one by one with the guest restored to a base snapshot before
//! each of them (isolated mode).

use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{ExitClass, TaskSetConfig};
use crate::error::{Error, Result};
use crate::guest::Guest;
use crate::harness::{Event, EventSink, Harness, JobDescriptorBuilder, NullEventSink, ResultParser};
use crate::models::{EntryWork, ScheduleResult, TaskDescriptor, TaskRun, TaskSetResults};
use crate::utils::Timer;

/// Runs entries requiring a particular capability
#[async_trait]
pub trait EntryRunner: Send + Sync {
    fn capability(&self) -> &str;

    /// Execute all tasks of an entry, returning their merged results
    async fn run_entry(&self, work: EntryWork) -> Result<TaskSetResults>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IsolationMode {
    /// All tasks in a single harness invocation
    Whole,
    /// One task per invocation, guest reset in between
    Isolated,
}

/// Isolate only when asked for, possible, and meaningful
pub fn isolation_mode(work: &EntryWork) -> IsolationMode {
    if work.environment.wants_isolation()
        && work.guest.supports_snapshots()
        && work.tasks.len() > 1
    {
        IsolationMode::Isolated
    } else {
        IsolationMode::Whole
    }
}

/// Entry result from its task runs: the first run not passing decides
pub fn derive_result(results: &TaskSetResults) -> ScheduleResult {
    match results.first_failure() {
        Some(run) => {
            debug!(
                "Task {} finished with {}/{}",
                run.name, run.results.status, run.results.result
            );
            ScheduleResult::Failed
        }
        None => ScheduleResult::Passed,
    }
}

/// Harness-backed [`EntryRunner`]
pub struct TaskSetRunner {
    capability: String,
    config: TaskSetConfig,
    harness: Arc<dyn Harness>,
    builder: Arc<dyn JobDescriptorBuilder>,
    parser: Arc<dyn ResultParser>,
    events: Arc<dyn EventSink>,
}

impl TaskSetRunner {
    pub fn new(
        capability: impl Into<String>,
        harness: Arc<dyn Harness>,
        builder: Arc<dyn JobDescriptorBuilder>,
        parser: Arc<dyn ResultParser>,
    ) -> Self {
        Self {
            capability: capability.into(),
            config: TaskSetConfig::default(),
            harness,
            builder,
            parser,
            events: Arc::new(NullEventSink),
        }
    }

    pub fn with_config(mut self, config: TaskSetConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    async fn run_isolated(&self, work: &EntryWork) -> Result<TaskSetResults> {
        let base = work.guest.create_snapshot().await?;
        debug!("Base snapshot {}", base);

        let mut partial = Vec::with_capacity(work.tasks.len());

        for task in &work.tasks {
            let guest = work.guest.restore_snapshot(&base).await?;
            let results = self
                .run_task_set(work, guest.as_ref(), std::slice::from_ref(task))
                .await?;

            partial.push(results);
        }

        Ok(TaskSetResults::merge(partial))
    }

    /// One harness invocation for a subset of the entry's tasks
    async fn run_task_set(
        &self,
        work: &EntryWork,
        guest: &dyn Guest,
        tasks: &[TaskDescriptor],
    ) -> Result<TaskSetResults> {
        let job = self.builder.build(tasks)?;
        let names: Vec<&str> = tasks.iter().map(|t| t.name.as_str()).collect();

        self.emit(work, "task-set.started", json!({ "tasks": names }));

        let output = match self.harness.execute(guest, &job).await {
            Ok(output) => output,
            Err(err) => {
                error!("Failed to run tasks: {}", err);
                self.capture_diagnostics(guest).await;
                self.emit(work, "task-set.crashed", json!({ "error": err.to_string() }));
                return Err(err);
            }
        };

        let execution = &output.execution;
        let class = self.config.exit_codes.classify(execution);
        debug!("Harness exited with {} ({:?})", execution.exit_code, class);

        let gathered = self.gather_results(work, &output.results_dir);

        let results = match class {
            ExitClass::Unknown(exit_code) => {
                error!(exit_code, "Harness crashed: {}", execution.stderr.trim());

                self.emit(
                    work,
                    "task-set.crashed",
                    json!({ "exit_code": exit_code, "stderr": execution.stderr }),
                );
                self.capture_diagnostics(guest).await;

                if !self.config.on_error_continue {
                    return Err(Error::HarnessCrashed {
                        exit_code,
                        stderr: execution.stderr.clone(),
                    });
                }

                // Without results there is nothing to continue with
                let results = gathered?;
                warn!("Continuing with {} gathered task runs", results.len());
                results
            }

            _ => match gathered {
                Ok(results) => results,
                Err(err) => {
                    self.emit(work, "task-set.crashed", json!({ "error": err.to_string() }));
                    return Err(err);
                }
            },
        };

        match class {
            ExitClass::TasksFailed => {
                if self.config.ignore_benign_failures && self.only_benign_failures(&results) {
                    warn!("One or more tasks failed, all of the failures are benign");
                } else {
                    error!("One or more tasks failed");
                }
            }

            ExitClass::Watchdog => {
                error!("Harness watchdog timer exceeded");
            }

            ExitClass::Success | ExitClass::Unknown(_) => {}
        }

        self.emit(
            work,
            "task-set.finished",
            json!({
                "exit_code": execution.exit_code,
                "results": results.to_builtins(),
            }),
        );

        Ok(results)
    }

    /// One task run per task the harness left results for
    fn gather_results(&self, work: &EntryWork, results_dir: &Path) -> Result<TaskSetResults> {
        let mut results = TaskSetResults::new();

        for task in self.parser.discover(results_dir)? {
            let parsed = self.parser.parse(results_dir, &task)?;
            results.push(TaskRun::new(
                task.name,
                &work.id,
                work.environment.clone(),
                parsed,
            ));
        }

        Ok(results)
    }

    /// At least one failing phase, and nothing but benign ones
    fn only_benign_failures(&self, results: &TaskSetResults) -> bool {
        let mut failing = results
            .iter()
            .flat_map(|run| run.results.failing_phases())
            .peekable();

        failing.peek().is_some() && failing.all(|phase| self.config.is_benign_phase(&phase.name))
    }

    /// Best-effort snapshot export for post-mortem; failures are only logged
    async fn capture_diagnostics(&self, guest: &dyn Guest) {
        if !self.config.on_error_snapshot {
            return;
        }

        let snapshot = match guest.create_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("Failed to create diagnostic snapshot: {}", err);
                return;
            }
        };

        match guest.export_snapshot(&snapshot).await {
            Ok(path) => info!("Diagnostic snapshot saved as {}", path.display()),
            Err(err) => warn!("Failed to export diagnostic snapshot: {}", err),
        }
    }

    fn emit(&self, work: &EntryWork, name: &str, payload: serde_json::Value) {
        self.events
            .emit(&Event::new(name).for_entry(&work.id).with_payload(payload));
    }
}

#[async_trait]
impl EntryRunner for TaskSetRunner {
    fn capability(&self) -> &str {
        &self.capability
    }

    async fn run_entry(&self, work: EntryWork) -> Result<TaskSetResults> {
        let timer = Timer::start(format!("entry {}", work.id));
        let mode = isolation_mode(&work);

        info!(
            "Running {} tasks on {} ({:?} mode)",
            work.tasks.len(),
            work.guest.name(),
            mode
        );

        let results = match mode {
            IsolationMode::Whole => {
                self.run_task_set(&work, work.guest.as_ref(), &work.tasks)
                    .await?
            }
            IsolationMode::Isolated => self.run_isolated(&work).await?,
        };

        info!(
            "Gathered {} task runs in {:.1}s",
            results.len(),
            timer.stop().as_secs_f64()
        );

        Ok(results)
    }
}

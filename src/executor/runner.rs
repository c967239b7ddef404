//! Schedule runner
//!
//! Routes every schedule entry to the entry runner providing its
//! capability and drives all entries through the job runner. Entry stage
//! transitions happen here, in job hooks, never inside the jobs.

use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, info_span};

use super::jobs::{resolve_fatal, run_jobs, Job, JobHooks, JobInfo};
use super::task_set::{derive_result, EntryRunner};
use crate::error::{Error, Result};
use crate::harness::{Event, EventSink, NullEventSink};
use crate::models::{Schedule, Stage, TaskSetResults};
use crate::output::schedule_table;

/// Message of the error raised when crashed entries left nothing better
const CRASH_FALLBACK: &str = "At least one entry crashed";

pub struct ScheduleRunner {
    runners: Vec<Arc<dyn EntryRunner>>,
    parallelize: bool,
    max_workers: Option<usize>,
    events: Arc<dyn EventSink>,
}

impl Default for ScheduleRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleRunner {
    pub fn new() -> Self {
        Self {
            runners: Vec::new(),
            parallelize: false,
            max_workers: None,
            events: Arc::new(NullEventSink),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn EntryRunner>) -> Self {
        self.runners.push(runner);
        self
    }

    /// Run entries in parallel instead of one by one
    pub fn parallelize(mut self, parallelize: bool) -> Self {
        self.parallelize = parallelize;
        self
    }

    /// Cap on entries running at once when parallelized
    pub fn max_workers(mut self, max_workers: Option<usize>) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    fn runner_for(&self, capability: &str) -> Option<&Arc<dyn EntryRunner>> {
        self.runners.iter().find(|r| r.capability() == capability)
    }

    /// Refuse schedules that cannot be run as a whole
    pub fn check(&self, schedule: &Schedule) -> Result<()> {
        if schedule.is_empty() {
            return Err(Error::EmptySchedule);
        }

        let mut guests = HashSet::new();

        for entry in schedule.iter() {
            if self.runner_for(entry.capability()).is_none() {
                return Err(Error::UnsupportedCapability {
                    entry: entry.id().to_string(),
                    capability: entry.capability().to_string(),
                });
            }

            if entry.stage() != Stage::Prepared {
                return Err(Error::InvalidTransition {
                    entry: entry.id().to_string(),
                    from: entry.stage(),
                    to: Stage::Running,
                });
            }

            let guest = entry
                .guest()
                .ok_or_else(|| Error::NoGuest(entry.id().to_string()))?;

            if !guests.insert(guest.name()) {
                return Err(Error::Config(format!(
                    "guest {} is assigned to more than one entry",
                    guest.name()
                )));
            }
        }

        Ok(())
    }

    /// Run every entry of the schedule to completion
    ///
    /// Entries that crash do not stop the others. Once all entries are
    /// complete, the most relevant of the crash errors is returned.
    pub async fn run(&self, schedule: &mut Schedule) -> Result<()> {
        self.check(schedule)?;

        self.events.emit(
            &Event::new("test-schedule.start").with_payload(json!({ "entries": schedule.len() })),
        );
        info!("Scheduled entries:\n{}", schedule_table(schedule));

        let jobs = schedule
            .iter()
            .map(|entry| -> Result<Job<TaskSetResults>> {
                let runner = self
                    .runner_for(entry.capability())
                    .cloned()
                    .ok_or_else(|| Error::UnsupportedCapability {
                        entry: entry.id().to_string(),
                        capability: entry.capability().to_string(),
                    })?;
                let work = entry.work()?;

                Ok(Job::new(entry.id(), async move { runner.run_entry(work).await })
                    .in_span(info_span!("entry", id = %entry.id())))
            })
            .collect::<Result<Vec<_>>>()?;

        let max_workers = if self.parallelize {
            self.max_workers
        } else {
            Some(1)
        };

        let mut hooks = ScheduleHooks {
            schedule: &mut *schedule,
            events: self.events.as_ref(),
        };
        let failures = run_jobs(jobs, max_workers, &mut hooks).await;

        info!("Finished entries:\n{}", schedule_table(schedule));

        if !failures.is_empty() {
            self.events.emit(&Event::new("test-schedule.error").with_payload(json!({
                "crashed": failures.iter().map(|f| f.job.name.as_str()).collect::<Vec<_>>(),
            })));

            return Err(resolve_fatal(failures, CRASH_FALLBACK));
        }

        self.events.emit(&Event::new("test-schedule.finished"));
        Ok(())
    }
}

/// Keeps schedule entries in sync with their jobs; job id is entry index
struct ScheduleHooks<'a> {
    schedule: &'a mut Schedule,
    events: &'a dyn EventSink,
}

impl JobHooks<TaskSetResults> for ScheduleHooks<'_> {
    fn on_start(&mut self, job: &JobInfo) {
        if let Some(entry) = self.schedule.entry_mut(job.id) {
            if let Err(err) = entry.start() {
                error!("{}", err);
            }
        }
    }

    fn on_complete(&mut self, job: &JobInfo, results: TaskSetResults) {
        let Some(entry) = self.schedule.entry_mut(job.id) else {
            return;
        };

        let result = derive_result(&results);
        let runs = results.len();

        if let Err(err) = entry.complete(results, result) {
            error!("{}", err);
            return;
        }

        info!(entry = %entry.id(), "Entry finished: {}", result);
        self.events.emit(
            &Event::new("schedule-entry.finished")
                .for_entry(entry.id())
                .with_payload(json!({ "result": result, "runs": runs })),
        );
    }

    fn on_error(&mut self, job: &JobInfo, err: &Error) {
        let Some(entry) = self.schedule.entry_mut(job.id) else {
            return;
        };

        if let Err(transition) = entry.crash() {
            error!("{}", transition);
            return;
        }
        error!(entry = %entry.id(), "Entry crashed: {}", err);

        self.events.emit(
            &Event::new("schedule-entry.finished")
                .for_entry(entry.id())
                .with_payload(json!({ "state": "error", "error": err.to_string() })),
        );
    }

    fn on_done(&mut self, _job: &JobInfo, remaining: usize) {
        debug!(
            "{} entries remaining:\n{}",
            remaining,
            schedule_table(self.schedule)
        );
    }
}

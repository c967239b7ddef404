//! Test schedule models
//!
//! A schedule is an ordered list of entries. Each entry describes what
//! tasks to run, on which guest, and tracks its own progress through
//! [`Stage`], [`State`] and [`ScheduleResult`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::{TaskDescriptor, TaskSetResults, TestingEnvironment};
use crate::error::{Error, Result};
use crate::guest::Guest;

/// Progress of a schedule entry, only ever moves forward
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Prepared,
    Running,
    Complete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Prepared => write!(f, "PREPARED"),
            Stage::Running => write!(f, "RUNNING"),
            Stage::Complete => write!(f, "COMPLETE"),
        }
    }
}

/// Whether processing of an entry crashed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    #[default]
    Ok,
    Error,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Ok => write!(f, "OK"),
            State::Error => write!(f, "ERROR"),
        }
    }
}

/// Result of an entry, or of the schedule as a whole
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleResult {
    #[default]
    Undefined,
    Passed,
    Failed,
    /// At least one entry crashed. Used for the schedule only.
    Error,
    Info,
    NotApplicable,
}

impl ScheduleResult {
    pub fn symbol(&self) -> &'static str {
        match self {
            ScheduleResult::Passed => "✓",
            ScheduleResult::Failed => "✗",
            ScheduleResult::Error => "!",
            ScheduleResult::Undefined => "?",
            ScheduleResult::Info | ScheduleResult::NotApplicable => "○",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScheduleResult::Passed)
    }

    /// Parse a result name, as used in configuration files
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().replace('-', "_").as_str() {
            "undefined" => Some(ScheduleResult::Undefined),
            "passed" => Some(ScheduleResult::Passed),
            "failed" => Some(ScheduleResult::Failed),
            "error" => Some(ScheduleResult::Error),
            "info" => Some(ScheduleResult::Info),
            "not_applicable" => Some(ScheduleResult::NotApplicable),
            _ => None,
        }
    }
}

impl fmt::Display for ScheduleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleResult::Undefined => write!(f, "UNDEFINED"),
            ScheduleResult::Passed => write!(f, "PASSED"),
            ScheduleResult::Failed => write!(f, "FAILED"),
            ScheduleResult::Error => write!(f, "ERROR"),
            ScheduleResult::Info => write!(f, "INFO"),
            ScheduleResult::NotApplicable => write!(f, "NOT_APPLICABLE"),
        }
    }
}

/// Everything a runner needs to execute an entry's tasks
///
/// Handed over to a job when the entry is dispatched; the entry itself
/// stays with the schedule.
#[derive(Clone)]
pub struct EntryWork {
    pub id: String,
    pub capability: String,
    pub environment: TestingEnvironment,
    pub tasks: Vec<TaskDescriptor>,
    pub guest: Arc<dyn Guest>,
}

impl fmt::Debug for EntryWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryWork")
            .field("id", &self.id)
            .field("capability", &self.capability)
            .field("environment", &self.environment)
            .field("tasks", &self.tasks)
            .field("guest", &self.guest.name())
            .finish()
    }
}

/// One unit of testing work, bound to one guest
pub struct ScheduleEntry {
    id: String,
    capability: String,
    environment: TestingEnvironment,
    tasks: Vec<TaskDescriptor>,
    guest: Option<Arc<dyn Guest>>,
    stage: Stage,
    state: State,
    result: ScheduleResult,
    results: Option<TaskSetResults>,
}

impl ScheduleEntry {
    pub fn new(
        id: impl Into<String>,
        capability: impl Into<String>,
        environment: TestingEnvironment,
    ) -> Self {
        Self {
            id: id.into(),
            capability: capability.into(),
            environment,
            tasks: Vec::new(),
            guest: None,
            stage: Stage::Prepared,
            state: State::Ok,
            result: ScheduleResult::Undefined,
            results: None,
        }
    }

    pub fn with_guest(mut self, guest: Arc<dyn Guest>) -> Self {
        self.guest = Some(guest);
        self
    }

    pub fn with_tasks(mut self, tasks: impl IntoIterator<Item = TaskDescriptor>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn capability(&self) -> &str {
        &self.capability
    }

    pub fn environment(&self) -> &TestingEnvironment {
        &self.environment
    }

    pub fn tasks(&self) -> &[TaskDescriptor] {
        &self.tasks
    }

    pub fn guest(&self) -> Option<&Arc<dyn Guest>> {
        self.guest.as_ref()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn result(&self) -> ScheduleResult {
        self.result
    }

    pub fn results(&self) -> Option<&TaskSetResults> {
        self.results.as_ref()
    }

    /// Package the entry for dispatching
    pub fn work(&self) -> Result<EntryWork> {
        let guest = self
            .guest
            .clone()
            .ok_or_else(|| Error::NoGuest(self.id.clone()))?;

        Ok(EntryWork {
            id: self.id.clone(),
            capability: self.capability.clone(),
            environment: self.environment.clone(),
            tasks: self.tasks.clone(),
            guest,
        })
    }

    /// PREPARED => RUNNING, right before the entry is dispatched
    pub fn start(&mut self) -> Result<()> {
        if self.stage != Stage::Prepared {
            return Err(self.invalid(Stage::Running));
        }

        self.shift(Stage::Running, self.state);
        Ok(())
    }

    /// RUNNING => COMPLETE, recording the entry's results
    pub fn complete(&mut self, results: TaskSetResults, result: ScheduleResult) -> Result<()> {
        if self.stage != Stage::Running {
            return Err(self.invalid(Stage::Complete));
        }

        self.shift(Stage::Complete, self.state);
        self.result = result;
        self.results = Some(results);
        Ok(())
    }

    /// Forced COMPLETE with ERROR state, result stays undefined
    pub fn crash(&mut self) -> Result<()> {
        if self.stage == Stage::Complete {
            return Err(self.invalid(Stage::Complete));
        }

        self.shift(Stage::Complete, State::Error);
        Ok(())
    }

    fn shift(&mut self, stage: Stage, state: State) {
        debug!(
            entry = %self.id,
            "shifted: {} => {}, {} => {}",
            self.stage, stage, self.state, state
        );

        self.stage = stage;
        self.state = state;
    }

    fn invalid(&self, to: Stage) -> Error {
        Error::InvalidTransition {
            entry: self.id.clone(),
            from: self.stage,
            to,
        }
    }
}

impl fmt::Debug for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleEntry")
            .field("id", &self.id)
            .field("capability", &self.capability)
            .field("environment", &self.environment)
            .field("guest", &self.guest.as_ref().map(|g| g.name().to_string()))
            .field("stage", &self.stage)
            .field("state", &self.state)
            .field("result", &self.result)
            .finish()
    }
}

/// Ordered schedule entries plus the overall result
#[derive(Debug, Default)]
pub struct Schedule {
    entries: Vec<ScheduleEntry>,
    result: ScheduleResult,
}

impl Schedule {
    pub fn new(entries: Vec<ScheduleEntry>) -> Self {
        Self {
            entries,
            result: ScheduleResult::Undefined,
        }
    }

    pub fn push(&mut self, entry: ScheduleEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn entry_mut(&mut self, index: usize) -> Option<&mut ScheduleEntry> {
        self.entries.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduleEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries not yet complete
    pub fn pending(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.stage != Stage::Complete)
            .count()
    }

    /// Overall result; meaningful once every entry is complete
    pub fn result(&self) -> ScheduleResult {
        self.result
    }

    pub(crate) fn set_result(&mut self, result: ScheduleResult) {
        self.result = result;
    }
}

impl FromIterator<ScheduleEntry> for Schedule {
    fn from_iter<I: IntoIterator<Item = ScheduleEntry>>(iter: I) -> Self {
        Schedule::new(iter.into_iter().collect())
    }
}

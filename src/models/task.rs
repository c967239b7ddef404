//! Task models
//!
//! Declared tasks, the results of running them, and task-set results.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::TestingEnvironment;

/// A task declared by a schedule entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub name: String,

    /// Harness-specific task parameters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl TaskDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// One phase (check) of a task run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPhase {
    pub name: String,
    pub result: String,
}

impl TaskPhase {
    pub fn new(name: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            result: result.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.result.eq_ignore_ascii_case("pass")
    }
}

/// Results of a single task run, as produced by a result parser
///
/// Only `status` and `result` are interpreted by the runner, the rest is
/// carried along for reporting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResults {
    pub status: String,
    pub result: String,

    #[serde(default)]
    pub phases: Vec<TaskPhase>,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl TaskResults {
    pub fn new(status: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            result: result.into(),
            phases: Vec::new(),
            payload: serde_json::Value::Null,
        }
    }

    /// Completed and passed
    pub fn passed() -> Self {
        Self::new("Completed", "Pass")
    }

    /// Completed and failed
    pub fn failed() -> Self {
        Self::new("Completed", "Fail")
    }

    pub fn with_phase(mut self, name: impl Into<String>, result: impl Into<String>) -> Self {
        self.phases.push(TaskPhase::new(name, result));
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// The canonical "completed and passed" outcome
    pub fn is_pass(&self) -> bool {
        self.status.eq_ignore_ascii_case("completed") && self.result.eq_ignore_ascii_case("pass")
    }

    pub fn failing_phases(&self) -> impl Iterator<Item = &TaskPhase> {
        self.phases.iter().filter(|phase| !phase.is_pass())
    }
}

/// One executed task occurrence
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub name: String,
    pub entry_id: String,
    pub environment: TestingEnvironment,
    pub results: TaskResults,
}

impl TaskRun {
    pub fn new(
        name: impl Into<String>,
        entry_id: impl Into<String>,
        environment: TestingEnvironment,
        results: TaskResults,
    ) -> Self {
        Self {
            name: name.into(),
            entry_id: entry_id.into(),
            environment,
            results,
        }
    }
}

/// Task name mapped to all of its runs, in execution order
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskSetResults {
    tasks: IndexMap<String, Vec<TaskRun>>,
}

impl TaskSetResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a run, keeping every earlier run of the same task
    pub fn push(&mut self, run: TaskRun) {
        self.tasks.entry(run.name.clone()).or_default().push(run);
    }

    /// Merge several task-set results into one
    ///
    /// Runs of a task spread across the inputs end up in a single list,
    /// in input order. Nothing is overwritten.
    pub fn merge(task_sets: impl IntoIterator<Item = TaskSetResults>) -> Self {
        let mut merged = TaskSetResults::new();

        for task_set in task_sets {
            for run in task_set.tasks.into_values().flatten() {
                merged.push(run);
            }
        }

        merged
    }

    pub fn runs(&self, name: &str) -> &[TaskRun] {
        self.tasks.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    /// All runs, task by task in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &TaskRun> {
        self.tasks.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.tasks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First run not reaching the canonical pass outcome
    pub fn first_failure(&self) -> Option<&TaskRun> {
        self.iter().find(|run| !run.results.is_pass())
    }

    /// Task name mapped to bare results, for logs and reports
    pub fn to_builtins(&self) -> IndexMap<String, Vec<TaskResults>> {
        self.tasks
            .iter()
            .map(|(name, runs)| {
                (
                    name.clone(),
                    runs.iter().map(|run| run.results.clone()).collect(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(name: &str, results: TaskResults) -> TaskRun {
        TaskRun::new(name, "1", TestingEnvironment::default(), results)
    }

    fn single(name: &str, results: TaskResults) -> TaskSetResults {
        let mut set = TaskSetResults::new();
        set.push(run(name, results));
        set
    }

    #[test]
    fn test_merge_keeps_repeated_runs_in_order() {
        let merged = TaskSetResults::merge(vec![
            single("t1", TaskResults::failed()),
            single("t2", TaskResults::passed()),
            single("t1", TaskResults::passed()),
        ]);

        assert_eq!(merged.runs("t1").len(), 2);
        assert_eq!(merged.runs("t2").len(), 1);
        assert_eq!(merged.runs("t1")[0].results, TaskResults::failed());
        assert_eq!(merged.runs("t1")[1].results, TaskResults::passed());
        assert_eq!(merged.names().collect::<Vec<_>>(), vec!["t1", "t2"]);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_canonical_pass_is_case_insensitive() {
        assert!(TaskResults::new("COMPLETED", "pass").is_pass());
        assert!(!TaskResults::new("Aborted", "Pass").is_pass());
        assert!(!TaskResults::new("Completed", "Warn").is_pass());
    }

    #[test]
    fn test_first_failure() {
        let mut set = TaskSetResults::new();
        set.push(run("a", TaskResults::passed()));
        set.push(run("b", TaskResults::new("Completed", "Warn")));
        set.push(run("c", TaskResults::failed()));

        assert_eq!(set.first_failure().map(|r| r.name.as_str()), Some("b"));
    }

    #[test]
    fn test_failing_phases() {
        let results = TaskResults::failed()
            .with_phase("setup", "PASS")
            .with_phase("test/avc", "FAIL");

        let failing: Vec<_> = results.failing_phases().map(|p| p.name.as_str()).collect();
        assert_eq!(failing, vec!["test/avc"]);
    }

    #[test]
    fn test_to_builtins() {
        let set = single("t1", TaskResults::passed());
        let builtins = set.to_builtins();
        assert_eq!(builtins["t1"], vec![TaskResults::passed()]);
    }
}

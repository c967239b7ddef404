//! Schedule execution engine
//!
//! A generic bounded-concurrency job runner, the task-set runner executing
//! one entry's tasks through a harness, and the schedule runner tying them
//! together.

mod jobs;
mod runner;
mod task_set;

pub use jobs::{resolve_fatal, run_jobs, Job, JobFailure, JobHooks, JobInfo, NoHooks};
pub use runner::ScheduleRunner;
pub use task_set::{derive_result, isolation_mode, EntryRunner, IsolationMode, TaskSetRunner};

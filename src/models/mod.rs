//! Data models for test schedules
//!
//! Schedule entries, their lifecycle, and the results of their tasks.

mod environment;
mod schedule;
mod task;

pub use environment::TestingEnvironment;
pub use schedule::{EntryWork, Schedule, ScheduleEntry, ScheduleResult, Stage, State};
pub use task::{TaskDescriptor, TaskPhase, TaskResults, TaskRun, TaskSetResults};

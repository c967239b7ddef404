//! Output formatting module
//!
//! Renders schedules as tables, JSON or one-line summaries.

mod formatter;

pub use formatter::{schedule_table, write_report, OutputFormat, ScheduleFormatter};

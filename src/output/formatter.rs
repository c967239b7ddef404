//! Output formatters for schedules
//!
//! Provides table, JSON and summary output formats.

use indexmap::IndexMap;
use serde::Serialize;
use std::io::Write;

use crate::models::{
    Schedule, ScheduleEntry, ScheduleResult, Stage, State, TaskResults, TestingEnvironment,
};

const HEADERS: [&str; 7] = ["SE", "Stage", "State", "Result", "Environment", "Guest", "Runner"];

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct EntryReport<'a> {
    id: &'a str,
    capability: &'a str,
    environment: &'a TestingEnvironment,
    guest: Option<&'a str>,
    stage: Stage,
    state: State,
    result: ScheduleResult,
    results: IndexMap<String, Vec<TaskResults>>,
}

#[derive(Serialize)]
struct ScheduleReport<'a> {
    result: ScheduleResult,
    entries: Vec<EntryReport<'a>>,
}

impl<'a> ScheduleReport<'a> {
    fn new(schedule: &'a Schedule) -> Self {
        Self {
            result: schedule.result(),
            entries: schedule
                .iter()
                .map(|entry| EntryReport {
                    id: entry.id(),
                    capability: entry.capability(),
                    environment: entry.environment(),
                    guest: entry.guest().map(|g| g.name()),
                    stage: entry.stage(),
                    state: entry.state(),
                    result: entry.result(),
                    results: entry
                        .results()
                        .map(|r| r.to_builtins())
                        .unwrap_or_default(),
                })
                .collect(),
        }
    }
}

/// Schedule formatter
pub struct ScheduleFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ScheduleFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format the whole schedule
    pub fn format_schedule(&self, schedule: &Schedule) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut output = self.format_table(schedule);
                output.push_str(&format!(
                    "\nOverall result: {}\n",
                    self.paint(schedule.result(), &schedule.result().to_string())
                ));
                output
            }
            OutputFormat::Json => {
                serde_json::to_string(&ScheduleReport::new(schedule)).unwrap_or_default()
            }
            OutputFormat::JsonPretty => {
                serde_json::to_string_pretty(&ScheduleReport::new(schedule)).unwrap_or_default()
            }
            OutputFormat::Summary => self.format_summary(schedule),
        }
    }

    fn format_table(&self, schedule: &Schedule) -> String {
        let rows: Vec<[String; 7]> = schedule.iter().map(row).collect();

        let mut widths = HEADERS.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row.iter()) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut output = String::new();
        push_line(&mut output, &HEADERS.map(str::to_string), &widths, |_, cell| {
            cell.to_string()
        });
        push_line(
            &mut output,
            &widths.map(|w| "─".repeat(w)),
            &widths,
            |_, cell| cell.to_string(),
        );

        for (entry, cells) in schedule.iter().zip(rows.iter()) {
            push_line(&mut output, cells, &widths, |column, padded| {
                if column == 3 {
                    self.paint(entry.result(), padded)
                } else if column == 2 && entry.state() == State::Error {
                    self.paint(ScheduleResult::Error, padded)
                } else {
                    padded.to_string()
                }
            });
        }

        output
    }

    fn format_summary(&self, schedule: &Schedule) -> String {
        let count = |result: ScheduleResult| {
            schedule
                .iter()
                .filter(|entry| entry.result() == result)
                .count()
        };
        let crashed = schedule.iter().filter(|e| e.state() == State::Error).count();

        format!(
            "{} {} - {} entries: {} passed, {} failed, {} crashed",
            schedule.result().symbol(),
            self.paint(schedule.result(), &schedule.result().to_string()),
            schedule.len(),
            count(ScheduleResult::Passed),
            count(ScheduleResult::Failed),
            crashed
        )
    }

    fn paint(&self, result: ScheduleResult, text: &str) -> String {
        if !self.colorize {
            return text.to_string();
        }

        let color = match result {
            ScheduleResult::Passed => "32",
            ScheduleResult::Failed | ScheduleResult::Error => "31",
            ScheduleResult::Info | ScheduleResult::NotApplicable => "33",
            ScheduleResult::Undefined => return text.to_string(),
        };

        format!("\x1b[{color}m{text}\x1b[0m")
    }
}

impl Default for ScheduleFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

fn row(entry: &ScheduleEntry) -> [String; 7] {
    [
        entry.id().to_string(),
        entry.stage().to_string(),
        entry.state().to_string(),
        entry.result().to_string(),
        entry.environment().values(),
        entry
            .guest()
            .map(|g| g.name().to_string())
            .unwrap_or_else(|| "<no guest>".to_string()),
        entry.capability().to_string(),
    ]
}

fn push_line<F>(output: &mut String, cells: &[String; 7], widths: &[usize; 7], style: F)
where
    F: Fn(usize, &str) -> String,
{
    let line: Vec<String> = cells
        .iter()
        .zip(widths.iter())
        .enumerate()
        .map(|(column, (cell, width))| {
            let padding = width.saturating_sub(cell.chars().count());
            style(column, &format!("{cell}{}", " ".repeat(padding)))
        })
        .collect();

    output.push_str(line.join("  ").trim_end());
    output.push('\n');
}

/// Plain schedule table, for logs
pub fn schedule_table(schedule: &Schedule) -> String {
    ScheduleFormatter::new(OutputFormat::Table)
        .no_color()
        .format_table(schedule)
}

/// Write a schedule report to a file
pub fn write_report(path: &str, schedule: &Schedule, format: OutputFormat) -> anyhow::Result<()> {
    let formatter = ScheduleFormatter::new(format).no_color();
    let content = formatter.format_schedule(schedule);

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

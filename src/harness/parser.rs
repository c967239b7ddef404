//! JSON result parser
//!
//! Expects the harness to leave `results.json` in its results directory:
//! an array of task objects, each with `name`, `status`, `result` and
//! optional `phases`. Any other fields are kept as the task payload.

use serde_json::Value;
use std::path::Path;
use tracing::debug;

use super::{DiscoveredTask, ResultParser};
use crate::error::{Error, Result};
use crate::models::{TaskPhase, TaskResults};

const RESULTS_FILE: &str = "results.json";

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonResultParser;

fn field<'a>(raw: &'a Value, name: &str) -> Option<&'a str> {
    raw.get(name).and_then(Value::as_str)
}

impl ResultParser for JsonResultParser {
    fn discover(&self, results_dir: &Path) -> Result<Vec<DiscoveredTask>> {
        let path = results_dir.join(RESULTS_FILE);
        debug!("Results lie in {}", path.display());

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::results(&path, format!("cannot read: {e}")))?;
        let tasks: Vec<Value> = serde_json::from_str(&content)
            .map_err(|e| Error::results(&path, format!("not a list of tasks: {e}")))?;

        tasks
            .into_iter()
            .map(|raw| {
                let name = field(&raw, "name")
                    .ok_or_else(|| Error::results(&path, "task without a name"))?
                    .to_string();
                Ok(DiscoveredTask { name, raw })
            })
            .collect()
    }

    fn parse(&self, results_dir: &Path, task: &DiscoveredTask) -> Result<TaskResults> {
        let missing = |what: &str| {
            Error::results(
                results_dir.join(RESULTS_FILE),
                format!("task '{}' has no {what}", task.name),
            )
        };

        let status = field(&task.raw, "status").ok_or_else(|| missing("status"))?;
        let result = field(&task.raw, "result").ok_or_else(|| missing("result"))?;

        let phases = task
            .raw
            .get("phases")
            .and_then(Value::as_array)
            .map(|phases| {
                phases
                    .iter()
                    .filter_map(|p| Some(TaskPhase::new(field(p, "name")?, field(p, "result")?)))
                    .collect()
            })
            .unwrap_or_default();

        let mut payload = task.raw.clone();
        if let Some(object) = payload.as_object_mut() {
            for key in ["name", "status", "result", "phases"] {
                object.remove(key);
            }
        }

        Ok(TaskResults {
            status: status.to_string(),
            result: result.to_string(),
            phases,
            payload,
        })
    }
}

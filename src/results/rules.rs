//! Result maps
//!
//! YAML files with rules overriding the overall schedule result. Files are
//! read in order and their rules appended; the first rule whose
//! conditions all hold decides the result.
//!
//! ```yaml
//! - description: Tests on aarch64 are informational only
//!   arch: aarch64
//!   current-result: [failed, error]
//!   set-result: info
//! - any-entry-result: not_applicable
//!   set-result: not_applicable
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use super::aggregate::{FirstMatchEvaluator, OverrideContext, OverrideRule};
use crate::error::{Error, Result};
use crate::models::ScheduleResult;

/// One override rule; conditions left out always hold
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ResultRule {
    #[serde(default)]
    pub description: Option<String>,

    /// Base result is one of these
    #[serde(default)]
    pub current_result: Vec<ScheduleResult>,

    /// At least one entry has this result
    #[serde(default)]
    pub any_entry_result: Option<ScheduleResult>,

    /// Every entry has this result
    #[serde(default)]
    pub all_entries_result: Option<ScheduleResult>,

    /// At least one entry requires this capability
    #[serde(default)]
    pub capability: Option<String>,

    /// At least one entry asked for this architecture
    #[serde(default)]
    pub arch: Option<String>,

    pub set_result: ScheduleResult,
}

impl OverrideRule for ResultRule {
    fn matches(&self, context: &OverrideContext<'_>) -> bool {
        let schedule = context.schedule;

        if !self.current_result.is_empty()
            && !self.current_result.contains(&context.current_result)
        {
            return false;
        }

        if let Some(expected) = self.any_entry_result {
            if !schedule.iter().any(|entry| entry.result() == expected) {
                return false;
            }
        }

        if let Some(expected) = self.all_entries_result {
            if !schedule.iter().all(|entry| entry.result() == expected) {
                return false;
            }
        }

        if let Some(ref capability) = self.capability {
            if !schedule.iter().any(|entry| entry.capability() == capability.as_str()) {
                return false;
            }
        }

        if let Some(ref arch) = self.arch {
            if !schedule
                .iter()
                .any(|entry| entry.environment().arch.as_deref() == Some(arch.as_str()))
            {
                return false;
            }
        }

        debug!(
            "result rule '{}' matched",
            self.description.as_deref().unwrap_or("-")
        );
        true
    }

    fn target(&self) -> ScheduleResult {
        self.set_result
    }
}

/// Ordered override rules from one or more files
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResultMap {
    rules: Vec<ResultRule>,
}

impl ResultMap {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let rules: Vec<ResultRule> = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid result map: {e}")))?;

        Ok(Self { rules })
    }

    /// Load and concatenate rules of all files, in order
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut map = ResultMap::default();

        for path in paths {
            let path = path.as_ref();
            let content = std::fs::read_to_string(path)?;

            let rules: Vec<ResultRule> = serde_yaml::from_str(&content).map_err(|e| {
                Error::Config(format!("invalid result map {}: {e}", path.display()))
            })?;

            debug!("loaded {} result rules from {}", rules.len(), path.display());
            map.rules.extend(rules);
        }

        Ok(map)
    }

    pub fn rules(&self) -> &[ResultRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn into_evaluator(self) -> FirstMatchEvaluator {
        let mut evaluator = FirstMatchEvaluator::new();
        for rule in self.rules {
            evaluator.push(Box::new(rule));
        }
        evaluator
    }
}

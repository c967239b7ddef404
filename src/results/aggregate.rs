//! Overall schedule result
//!
//! The base result is derived from entry stages, states and results. An
//! optional rule evaluator may then replace it.

use std::fmt;
use tracing::debug;

use crate::error::Result;
use crate::models::{Schedule, ScheduleResult, Stage, State};

/// Result of a schedule from its entries alone
pub fn base_result(schedule: &Schedule) -> ScheduleResult {
    if schedule.is_empty() {
        return ScheduleResult::Undefined;
    }

    if schedule.iter().any(|entry| entry.stage() != Stage::Complete) {
        return ScheduleResult::Undefined;
    }

    if schedule.iter().any(|entry| entry.state() != State::Ok) {
        return ScheduleResult::Error;
    }

    schedule
        .iter()
        .map(|entry| entry.result())
        .find(|result| *result != ScheduleResult::Passed)
        .unwrap_or(ScheduleResult::Passed)
}

/// What override rules get to look at
#[derive(Clone, Copy)]
pub struct OverrideContext<'a> {
    pub schedule: &'a Schedule,
    pub current_result: ScheduleResult,
}

impl fmt::Debug for OverrideContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideContext")
            .field("entries", &self.schedule.len())
            .field("current_result", &self.current_result)
            .finish()
    }
}

/// A condition and the result to use when it holds
pub trait OverrideRule: Send + Sync {
    fn matches(&self, context: &OverrideContext<'_>) -> bool;

    fn target(&self) -> ScheduleResult;
}

type Predicate = dyn Fn(&OverrideContext<'_>) -> bool + Send + Sync;

/// Rule backed by a closure
pub struct PredicateRule {
    predicate: Box<Predicate>,
    target: ScheduleResult,
}

impl PredicateRule {
    pub fn new<F>(target: ScheduleResult, predicate: F) -> Self
    where
        F: Fn(&OverrideContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Box::new(predicate),
            target,
        }
    }
}

impl OverrideRule for PredicateRule {
    fn matches(&self, context: &OverrideContext<'_>) -> bool {
        (self.predicate)(context)
    }

    fn target(&self) -> ScheduleResult {
        self.target
    }
}

/// Produces the final result from the base one
pub trait RuleEvaluator {
    fn evaluate(&self, context: &OverrideContext<'_>) -> Result<ScheduleResult>;
}

/// The first matching rule wins, later rules are not consulted
#[derive(Default)]
pub struct FirstMatchEvaluator {
    rules: Vec<Box<dyn OverrideRule>>,
}

impl FirstMatchEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: impl OverrideRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn push(&mut self, rule: Box<dyn OverrideRule>) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleEvaluator for FirstMatchEvaluator {
    fn evaluate(&self, context: &OverrideContext<'_>) -> Result<ScheduleResult> {
        Ok(self
            .rules
            .iter()
            .find(|rule| rule.matches(context))
            .map(|rule| rule.target())
            .unwrap_or(context.current_result))
    }
}

/// Compute, store and return the overall result of a schedule
pub fn overall_result(
    schedule: &mut Schedule,
    evaluator: Option<&dyn RuleEvaluator>,
) -> Result<ScheduleResult> {
    let base = base_result(schedule);
    debug!("base overall result: {}", base);

    let result = match evaluator {
        Some(evaluator) => {
            let custom = evaluator.evaluate(&OverrideContext {
                schedule: &*schedule,
                current_result: base,
            })?;
            debug!("custom overall result: {}", custom);
            custom
        }
        None => base,
    };

    schedule.set_result(result);
    Ok(result)
}

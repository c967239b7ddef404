//! Schedule results
//!
//! Overall result aggregation and user-defined override rules.

mod aggregate;
mod rules;

pub use aggregate::{
    base_result, overall_result, FirstMatchEvaluator, OverrideContext, OverrideRule,
    PredicateRule, RuleEvaluator,
};
pub use rules::{ResultMap, ResultRule};

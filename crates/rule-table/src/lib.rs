//! Validation Rule Table
//!
//! Binds a validator and its parameters to each (tracer, workflow) pair,
//! together with the action taken on either outcome.

mod evaluator;
mod rule;
mod table;

pub use evaluator::{CleanerEvaluator, RuleEvaluator, ThresholdValidator, VolumeValidator};
pub use rule::{Action, Rule, RuleConfig, ValidatorKind};
pub use table::RuleTable;

//! Rule and action types

use serde::{Deserialize, Serialize};

/// What the fallback loop does after a rule is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Keep this workflow's result, try nothing else
    Stop,
    /// Fall through to the next workflow
    Continue,
}

/// Validator selection with its bound parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidatorKind {
    /// Clean the mask and require `threshold` significant voxels
    LabelAboveThreshold { threshold: u32 },
}

impl ValidatorKind {
    /// Whether the bound parameters are usable
    pub fn is_valid(&self) -> bool {
        match self {
            ValidatorKind::LabelAboveThreshold { threshold } => *threshold > 0,
        }
    }
}

/// A validator plus the actions for each outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub validator: ValidatorKind,
    pub action_on_true: Action,
    pub action_on_false: Action,
}

impl Rule {
    pub fn new(validator: ValidatorKind, action_on_true: Action, action_on_false: Action) -> Self {
        Self {
            validator,
            action_on_true,
            action_on_false,
        }
    }

    /// Action bound to an evaluation outcome
    pub fn action_for(&self, outcome: bool) -> Action {
        if outcome {
            self.action_on_true
        } else {
            self.action_on_false
        }
    }
}

/// Declarative rule entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub tracer: String,
    pub workflow: String,
    pub validator: ValidatorKind,
    pub action_on_true: Action,
    pub action_on_false: Action,
}

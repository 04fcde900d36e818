//! Fallback states and run reports

use rule_table::Action;
use std::path::PathBuf;

/// Result kept when the loop stops on a workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub workflow: String,
    pub target_label: Option<u16>,
    /// Produced (and possibly cleaned) volume
    pub volume: PathBuf,
    /// Rule outcome; a stop can still carry a rejected mask
    pub outcome: bool,
    /// False when no rule was configured and the volume was trusted as-is
    pub validated: bool,
}

/// Position of a tracer run in the fallback loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackState {
    /// Workflow at this index is next
    Pending(usize),
    /// Stopped on a workflow
    Accepted(Accepted),
    /// Every workflow asked to continue
    Exhausted,
}

impl FallbackState {
    pub fn initial() -> Self {
        FallbackState::Pending(0)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, FallbackState::Pending(_))
    }
}

/// One inference + validation round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub workflow: String,
    pub volume: PathBuf,
    /// `None` when no rule applies to the workflow
    pub outcome: Option<bool>,
    pub action: Action,
}

/// Terminal result of a tracer run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Accepted(Accepted),
    Exhausted,
}

impl RunOutcome {
    /// The kept result, if any
    pub fn accepted(&self) -> Option<&Accepted> {
        match self {
            RunOutcome::Accepted(accepted) => Some(accepted),
            RunOutcome::Exhausted => None,
        }
    }

    /// True when a workflow was kept and its mask passed validation
    pub fn has_finding(&self) -> bool {
        self.accepted().map(|a| a.outcome).unwrap_or(false)
    }
}

/// Everything that happened in one tracer run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub tracer: String,
    pub case_id: String,
    pub attempts: Vec<Attempt>,
    pub outcome: RunOutcome,
}

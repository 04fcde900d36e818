//! Workflow Fallback Controller
//!
//! Tries a tracer's candidate workflows in priority order, validating each
//! produced mask with its rule and stopping or falling through according to
//! the rule's actions.

mod controller;
mod state;

pub use controller::{Case, FallbackController, Transition};
pub use state::{Accepted, Attempt, FallbackState, RunOutcome, RunReport};

use inference_engine::InferenceError;
use labeled_volume::VolumeError;
use thiserror::Error;
use workflow_registry::ConfigurationError;

/// Errors that abort a tracer run.
///
/// A rejected mask is not an error; it is an ordinary outcome handled by the
/// rule's actions.
#[derive(Debug, Error)]
pub enum FallbackError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("Inference failed for workflow {workflow}: {source}")]
    Inference {
        workflow: String,
        #[source]
        source: InferenceError,
    },
    #[error("Could not validate the volume of workflow {workflow}: {source}")]
    Validation {
        workflow: String,
        #[source]
        source: VolumeError,
    },
}

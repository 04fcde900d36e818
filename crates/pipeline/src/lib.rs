//! Lesion Segmentation Pipeline
//!
//! Loads the tracer catalog and settings once at startup and runs
//! independent cases through the workflow fallback loop in parallel.

mod batch;
mod catalog;
mod logging;
mod settings;

pub use batch::{BatchRunner, CaseResult};
pub use catalog::{Catalog, CatalogConfig};
pub use logging::init_logging;
pub use settings::PipelineSettings;

pub use fallback::{Case, FallbackError, RunOutcome, RunReport};

use thiserror::Error;
use workflow_registry::ConfigurationError;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Fallback(#[from] FallbackError),
    #[error("Invalid log level '{0}'")]
    InvalidLogLevel(String),
    #[error("Case task failed: {0}")]
    Join(String),
    #[error("Batch runner is shut down")]
    Closed,
}

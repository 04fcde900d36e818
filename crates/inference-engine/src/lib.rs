//! Segmentation Inference
//!
//! Interface to the external model runner that turns a workflow's input
//! channels into a labeled volume, plus a runner that shells out to it.

mod inputs;
mod runner;

pub use inputs::{locate_inputs, ChannelInput, InferenceRequest, STAGING_DIR};
pub use runner::{CommandRunner, CommandRunnerConfig, SegmentationRunner};

use std::path::PathBuf;
use thiserror::Error;

/// Errors while producing a volume
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Missing input for channel {channel}: {path}")]
    MissingInput { channel: String, path: PathBuf },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to start model runner '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Model runner exited with {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },
    #[error("Model runner produced no volume at {0}")]
    MissingOutput(PathBuf),
}

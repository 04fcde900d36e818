//! Tracer Workflow Registry
//!
//! Maps each tracer to its ordered candidate workflows and the input
//! channels every workflow needs. Built once and validated up front.

mod config;
mod error;
mod registry;

pub use config::{ChannelConfig, TracerConfig, WorkflowConfig};
pub use error::ConfigurationError;
pub use registry::{Channel, Tracer, Workflow, WorkflowRegistry};

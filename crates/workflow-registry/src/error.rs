//! Configuration Error Types

use thiserror::Error;

/// Malformed tracer, workflow or rule configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Required identifier left blank
    #[error("Empty {field} in {context}")]
    EmptyField { field: &'static str, context: String },

    #[error("Tracer '{0}' is declared more than once")]
    DuplicateTracer(String),

    #[error("Tracer '{0}' declares no workflows")]
    NoWorkflows(String),

    #[error("Tracer '{tracer}' declares workflow '{workflow}' more than once")]
    DuplicateWorkflow { tracer: String, workflow: String },

    #[error("Workflow '{tracer}/{workflow}' declares no channels")]
    NoChannels { tracer: String, workflow: String },

    #[error("Workflow '{tracer}/{workflow}' declares channel '{channel}' more than once")]
    DuplicateChannel {
        tracer: String,
        workflow: String,
        channel: String,
    },

    #[error("Workflow '{tracer}/{workflow}' has no channel for reference modality '{modality}'")]
    MissingReferenceChannel {
        tracer: String,
        workflow: String,
        modality: String,
    },

    #[error("Unknown tracer '{0}'")]
    UnknownTracer(String),

    #[error("Tracer '{tracer}' has no workflow '{workflow}'")]
    UnknownWorkflow { tracer: String, workflow: String },

    #[error("More than one rule for '{tracer}/{workflow}'")]
    DuplicateRule { tracer: String, workflow: String },

    #[error("Rule for '{tracer}/{workflow}' needs a positive threshold")]
    InvalidThreshold { tracer: String, workflow: String },
}

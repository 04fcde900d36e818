//! Declarative tracer configuration

use serde::{Deserialize, Serialize};

/// One input channel and the file suffix that carries it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub suffix: String,
}

/// A candidate workflow; list position is its fallback priority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub name: String,
    /// Label value of the target class in the produced volume
    #[serde(default)]
    pub target_label: Option<u16>,
    /// Channels in model input order
    pub channels: Vec<ChannelConfig>,
}

/// A tracer and its candidate workflows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracerConfig {
    pub name: String,
    pub reference_modality: String,
    #[serde(default)]
    pub workflows: Vec<WorkflowConfig>,
}

impl ChannelConfig {
    pub fn new(name: &str, suffix: &str) -> Self {
        Self {
            name: name.to_string(),
            suffix: suffix.to_string(),
        }
    }
}

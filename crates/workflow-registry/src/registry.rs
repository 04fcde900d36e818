//! Registry construction and queries

use crate::{ConfigurationError, TracerConfig, WorkflowConfig};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// A named input image stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    /// File suffix locating this channel for a case
    pub suffix: String,
}

/// One candidate processing path for a tracer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    pub name: String,
    /// Fallback position, 0 is tried first
    pub priority: usize,
    pub target_label: Option<u16>,
    pub channels: Vec<Channel>,
}

/// An acquisition protocol and its ordered workflows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracer {
    pub name: String,
    pub reference_modality: String,
    pub workflows: Vec<Workflow>,
}

/// Read-only tracer to workflow mapping
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    tracers: BTreeMap<String, Tracer>,
}

fn require(value: &str, field: &'static str, context: &str) -> Result<(), ConfigurationError> {
    if value.trim().is_empty() {
        return Err(ConfigurationError::EmptyField {
            field,
            context: context.to_string(),
        });
    }
    Ok(())
}

fn build_workflow(
    tracer: &TracerConfig,
    priority: usize,
    config: WorkflowConfig,
) -> Result<Workflow, ConfigurationError> {
    require(&config.name, "workflow name", &format!("tracer '{}'", tracer.name))?;
    let context = format!("workflow '{}/{}'", tracer.name, config.name);

    if config.channels.is_empty() {
        return Err(ConfigurationError::NoChannels {
            tracer: tracer.name.clone(),
            workflow: config.name,
        });
    }

    let mut seen = HashSet::new();
    for channel in &config.channels {
        require(&channel.name, "channel name", &context)?;
        require(&channel.suffix, "channel suffix", &context)?;
        if !seen.insert(channel.name.as_str()) {
            return Err(ConfigurationError::DuplicateChannel {
                tracer: tracer.name.clone(),
                workflow: config.name.clone(),
                channel: channel.name.clone(),
            });
        }
    }

    if !seen.contains(tracer.reference_modality.as_str()) {
        return Err(ConfigurationError::MissingReferenceChannel {
            tracer: tracer.name.clone(),
            workflow: config.name,
            modality: tracer.reference_modality.clone(),
        });
    }

    Ok(Workflow {
        name: config.name,
        priority,
        target_label: config.target_label,
        channels: config
            .channels
            .into_iter()
            .map(|c| Channel {
                name: c.name,
                suffix: c.suffix,
            })
            .collect(),
    })
}

impl WorkflowRegistry {
    /// Build and validate the registry
    pub fn from_configs(configs: Vec<TracerConfig>) -> Result<Self, ConfigurationError> {
        let mut tracers = BTreeMap::new();

        for config in configs {
            require(&config.name, "tracer name", "registry")?;
            require(
                &config.reference_modality,
                "reference modality",
                &format!("tracer '{}'", config.name),
            )?;

            if tracers.contains_key(&config.name) {
                return Err(ConfigurationError::DuplicateTracer(config.name));
            }
            if config.workflows.is_empty() {
                return Err(ConfigurationError::NoWorkflows(config.name));
            }

            let mut names = HashSet::new();
            let mut workflows = Vec::with_capacity(config.workflows.len());
            for (priority, workflow) in config.workflows.iter().cloned().enumerate() {
                if !names.insert(workflow.name.clone()) {
                    return Err(ConfigurationError::DuplicateWorkflow {
                        tracer: config.name.clone(),
                        workflow: workflow.name,
                    });
                }
                workflows.push(build_workflow(&config, priority, workflow)?);
            }

            debug!(
                "Registered tracer {} with workflows {:?}",
                config.name,
                workflows.iter().map(|w| w.name.as_str()).collect::<Vec<_>>()
            );

            tracers.insert(
                config.name.clone(),
                Tracer {
                    name: config.name,
                    reference_modality: config.reference_modality,
                    workflows,
                },
            );
        }

        info!("Workflow registry built with {} tracers", tracers.len());
        Ok(Self { tracers })
    }

    /// All registered tracers, by name
    pub fn tracers(&self) -> impl Iterator<Item = &Tracer> {
        self.tracers.values()
    }

    /// Look up a tracer
    pub fn tracer(&self, tracer: &str) -> Result<&Tracer, ConfigurationError> {
        self.tracers
            .get(tracer)
            .ok_or_else(|| ConfigurationError::UnknownTracer(tracer.to_string()))
    }

    /// Candidate workflows in fallback order
    pub fn workflows_for(&self, tracer: &str) -> Result<&[Workflow], ConfigurationError> {
        Ok(&self.tracer(tracer)?.workflows)
    }

    /// Look up one workflow of a tracer
    pub fn workflow(&self, tracer: &str, workflow: &str) -> Result<&Workflow, ConfigurationError> {
        self.workflows_for(tracer)?
            .iter()
            .find(|w| w.name == workflow)
            .ok_or_else(|| ConfigurationError::UnknownWorkflow {
                tracer: tracer.to_string(),
                workflow: workflow.to_string(),
            })
    }

    /// Input channels (name and suffix) a workflow needs, in input order
    pub fn required_channels(
        &self,
        tracer: &str,
        workflow: &str,
    ) -> Result<&[Channel], ConfigurationError> {
        Ok(&self.workflow(tracer, workflow)?.channels)
    }

    /// Whether a (tracer, workflow) pair is registered
    pub fn contains(&self, tracer: &str, workflow: &str) -> bool {
        self.workflow(tracer, workflow).is_ok()
    }
}

//! Tracer catalog: workflows plus rules, loaded once per process

use crate::{PipelineError, PipelineSettings};
use once_cell::sync::OnceCell;
use rule_table::{Action, RuleConfig, RuleTable, ValidatorKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use workflow_registry::{
    ChannelConfig, ConfigurationError, TracerConfig, WorkflowConfig, WorkflowRegistry,
};

static GLOBAL_CATALOG: OnceCell<Catalog> = OnceCell::new();

/// Declarative catalog as found in a configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub tracers: Vec<TracerConfig>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl CatalogConfig {
    /// Tracers, workflows and rules shipped with the pipeline
    pub fn builtin() -> Self {
        Self {
            tracers: vec![
                TracerConfig {
                    name: "fdg".to_string(),
                    reference_modality: "PT".to_string(),
                    workflows: vec![WorkflowConfig {
                        name: "pet_ct".to_string(),
                        target_label: Some(11),
                        channels: vec![
                            ChannelConfig::new("PT", "0000.nii.gz"),
                            ChannelConfig::new("CT", "0001.nii.gz"),
                        ],
                    }],
                },
                TracerConfig {
                    name: "psma".to_string(),
                    reference_modality: "PT".to_string(),
                    workflows: vec![WorkflowConfig {
                        name: "pet".to_string(),
                        target_label: None,
                        channels: vec![ChannelConfig::new("PT", "0000.nii.gz")],
                    }],
                },
            ],
            rules: vec![RuleConfig {
                tracer: "fdg".to_string(),
                workflow: "pet_ct".to_string(),
                validator: ValidatorKind::LabelAboveThreshold { threshold: 10 },
                action_on_true: Action::Stop,
                action_on_false: Action::Stop,
            }],
        }
    }

    /// Read a catalog file (TOML, JSON or YAML by extension)
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

/// Validated, read-only workflow registry and rule table
#[derive(Debug, Clone)]
pub struct Catalog {
    registry: WorkflowRegistry,
    rules: RuleTable,
}

impl Catalog {
    /// Validate a declarative catalog
    pub fn from_config(config: CatalogConfig) -> Result<Self, ConfigurationError> {
        let registry = WorkflowRegistry::from_configs(config.tracers)?;
        let rules = RuleTable::from_configs(config.rules, &registry)?;
        for tracer in registry.tracers() {
            let workflows: Vec<&str> = tracer.workflows.iter().map(|w| w.name.as_str()).collect();
            info!("Tracer {}: workflows {:?}", tracer.name, workflows);
        }
        Ok(Self { registry, rules })
    }

    /// Load and validate a catalog file
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        info!("Loading tracer catalog from {}", path.display());
        Ok(Self::from_config(CatalogConfig::from_file(path)?)?)
    }

    /// Catalog shipped with the pipeline
    pub fn builtin() -> Result<Self, ConfigurationError> {
        Self::from_config(CatalogConfig::builtin())
    }

    /// Process-wide catalog, built from `settings` on first use.
    ///
    /// Later calls return the catalog built by the first one.
    pub fn global(settings: &PipelineSettings) -> Result<&'static Catalog, PipelineError> {
        GLOBAL_CATALOG.get_or_try_init(|| settings.catalog())
    }

    /// Process-wide catalog, if one was built
    pub fn try_global() -> Option<&'static Catalog> {
        GLOBAL_CATALOG.get()
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }
}

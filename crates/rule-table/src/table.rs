//! Rule lookup table

use crate::{Rule, RuleConfig};
use std::collections::BTreeMap;
use tracing::info;
use workflow_registry::{ConfigurationError, WorkflowRegistry};

/// Read-only (tracer, workflow) to rule mapping
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: BTreeMap<String, BTreeMap<String, Rule>>,
}

impl RuleTable {
    /// Build and validate the table against the registered workflows
    pub fn from_configs(
        configs: Vec<RuleConfig>,
        registry: &WorkflowRegistry,
    ) -> Result<Self, ConfigurationError> {
        let mut rules: BTreeMap<String, BTreeMap<String, Rule>> = BTreeMap::new();
        let mut count = 0;

        for config in configs {
            registry.workflow(&config.tracer, &config.workflow)?;

            if !config.validator.is_valid() {
                return Err(ConfigurationError::InvalidThreshold {
                    tracer: config.tracer,
                    workflow: config.workflow,
                });
            }

            let by_workflow = rules.entry(config.tracer.clone()).or_default();
            if by_workflow.contains_key(&config.workflow) {
                return Err(ConfigurationError::DuplicateRule {
                    tracer: config.tracer,
                    workflow: config.workflow,
                });
            }

            by_workflow.insert(
                config.workflow,
                Rule::new(config.validator, config.action_on_true, config.action_on_false),
            );
            count += 1;
        }

        info!("Rule table built with {} rules", count);
        Ok(Self { rules })
    }

    /// Rule for a pair; `None` means the result is trusted as-is
    pub fn lookup(&self, tracer: &str, workflow: &str) -> Option<&Rule> {
        self.rules.get(tracer)?.get(workflow)
    }

    /// Number of configured rules
    pub fn len(&self) -> usize {
        self.rules.values().map(|r| r.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

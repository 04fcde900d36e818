//! Pipeline settings

use crate::{Catalog, PipelineError};
use config::{Config, Environment, File};
use inference_engine::CommandRunnerConfig;
use labeled_volume::VolumeFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use volume_cleaner::CleanerConfig;

/// Environment variable prefix, e.g. `LESION_MAX_PARALLEL_CASES`
pub const ENV_PREFIX: &str = "LESION";

/// Runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Catalog file; the built-in catalog is used when unset
    pub catalog_path: Option<PathBuf>,
    pub cleaner: CleanerConfig,
    pub runner: CommandRunnerConfig,
    /// Format of the volumes the runner writes and the cleaner rewrites
    pub volume_format: VolumeFormat,
    /// Cases processed concurrently
    pub max_parallel_cases: usize,
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            catalog_path: None,
            cleaner: CleanerConfig::default(),
            runner: CommandRunnerConfig::default(),
            volume_format: VolumeFormat::Auto,
            max_parallel_cases: 1,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl PipelineSettings {
    /// Load settings from an optional file, overridden by `LESION_*`
    /// environment variables (`__` separates nested keys)
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Build the catalog these settings point at
    pub fn catalog(&self) -> Result<Catalog, PipelineError> {
        match &self.catalog_path {
            Some(path) => Catalog::load(path),
            None => Ok(Catalog::builtin()?),
        }
    }
}

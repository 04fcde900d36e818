//! Logging setup

use crate::PipelineError;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install the global tracing subscriber.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_logging(level: &str, json: bool) -> Result<bool, PipelineError> {
    let level: Level = level
        .parse()
        .map_err(|_| PipelineError::InvalidLogLevel(level.to_string()))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let installed = if json {
        tracing::subscriber::set_global_default(builder.json().finish()).is_ok()
    } else {
        tracing::subscriber::set_global_default(builder.finish()).is_ok()
    };
    Ok(installed)
}

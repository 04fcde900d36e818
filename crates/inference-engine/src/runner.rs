//! Model runner implementations

use crate::{InferenceError, InferenceRequest};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Produces a labeled volume for one workflow attempt.
///
/// On success the returned path must point at an existing volume; failures
/// are reported as errors, never as an empty or stale path.
pub trait SegmentationRunner {
    fn segment(&self, request: &InferenceRequest) -> Result<PathBuf, InferenceError>;
}

impl<R: SegmentationRunner + ?Sized> SegmentationRunner for &R {
    fn segment(&self, request: &InferenceRequest) -> Result<PathBuf, InferenceError> {
        (**self).segment(request)
    }
}

/// External runner command line.
///
/// `args` may contain `{input_dir}` (the staged directory holding only the
/// workflow's channels), `{inputs}`, `{output_dir}`, `{case_id}`, `{tracer}`
/// and `{workflow}` placeholders. An argument that is exactly `{inputs}`
/// becomes one argument per staged channel file; inside a longer argument the
/// paths are joined with spaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandRunnerConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Suffix of the volume the runner writes, after the case id
    pub output_suffix: String,
}

impl Default for CommandRunnerConfig {
    fn default() -> Self {
        Self {
            program: "segment-case".to_string(),
            args: vec![
                "--input".to_string(),
                "{input_dir}".to_string(),
                "--output".to_string(),
                "{output_dir}".to_string(),
                "--tracer".to_string(),
                "{tracer}".to_string(),
                "--workflow".to_string(),
                "{workflow}".to_string(),
            ],
            output_suffix: ".nii.gz".to_string(),
        }
    }
}

/// Runs the model as a child process
pub struct CommandRunner {
    config: CommandRunnerConfig,
}

const STDERR_TAIL: usize = 2048;

fn lossy(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl CommandRunner {
    pub fn new(config: CommandRunnerConfig) -> Self {
        info!("Creating command runner for '{}'", config.program);
        Self { config }
    }

    fn expand(&self, request: &InferenceRequest, staged: &[PathBuf]) -> Vec<String> {
        let staged: Vec<String> = staged.iter().map(|p| p.to_string_lossy().into_owned()).collect();

        let mut args = Vec::with_capacity(self.config.args.len() + staged.len());
        for arg in &self.config.args {
            if arg == "{inputs}" {
                args.extend(staged.iter().cloned());
                continue;
            }
            args.push(
                arg.replace("{inputs}", &staged.join(" "))
                    .replace("{input_dir}", &lossy(&request.staging_dir))
                    .replace("{output_dir}", &lossy(&request.output_dir))
                    .replace("{case_id}", &request.case_id)
                    .replace("{tracer}", &request.tracer)
                    .replace("{workflow}", &request.workflow),
            );
        }
        args
    }
}

impl SegmentationRunner for CommandRunner {
    fn segment(&self, request: &InferenceRequest) -> Result<PathBuf, InferenceError> {
        request.validate_inputs()?;

        fs::create_dir_all(&request.output_dir).map_err(|source| InferenceError::Io {
            path: request.output_dir.clone(),
            source,
        })?;

        let output = request.expected_output(&self.config.output_suffix);
        if output.exists() {
            debug!("Removing stale output {}", output.display());
            fs::remove_file(&output).map_err(|source| InferenceError::Io {
                path: output.clone(),
                source,
            })?;
        }

        let staged = request.stage_inputs()?;
        let args = self.expand(request, &staged);
        debug!("Running {} {:?}", self.config.program, args);
        let start = Instant::now();

        let result = Command::new(&self.config.program)
            .args(&args)
            .output()
            .map_err(|source| InferenceError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).into_owned();
            let tail_start = stderr.len().saturating_sub(STDERR_TAIL);
            let tail = stderr
                .get(tail_start..)
                .unwrap_or(stderr.as_str())
                .trim()
                .to_string();
            warn!(
                "Model runner failed for {}/{} on case {}",
                request.tracer, request.workflow, request.case_id
            );
            return Err(InferenceError::ExitStatus {
                code: result.status.code(),
                stderr: tail,
            });
        }

        if !output.is_file() {
            return Err(InferenceError::MissingOutput(output));
        }

        info!(
            "Segmented case {} with {}/{} in {}ms",
            request.case_id,
            request.tracer,
            request.workflow,
            start.elapsed().as_millis()
        );
        Ok(output)
    }
}

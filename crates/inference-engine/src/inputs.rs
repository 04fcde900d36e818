//! Channel input resolution

use crate::InferenceError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use workflow_registry::{Channel, Workflow};

/// Directory under a case's output root holding per-workflow staged inputs
pub const STAGING_DIR: &str = ".inputs";

/// One input file, in model channel order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInput {
    pub channel: String,
    /// Model input channel index
    pub index: usize,
    pub path: PathBuf,
}

/// Everything the model runner needs for one workflow attempt
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub case_id: String,
    pub tracer: String,
    pub workflow: String,
    /// Case directory holding every channel of the case
    pub case_dir: PathBuf,
    /// The workflow's channel files inside `case_dir`
    pub inputs: Vec<ChannelInput>,
    /// Directory holding only this workflow's inputs while the runner works
    pub staging_dir: PathBuf,
    /// Directory the produced volume is written into
    pub output_dir: PathBuf,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> InferenceError {
    let path = path.to_path_buf();
    move |source| InferenceError::Io { path, source }
}

/// Resolve channel files as `<case_dir>/<case_id>_<suffix>`
pub fn locate_inputs(case_dir: &Path, case_id: &str, channels: &[Channel]) -> Vec<ChannelInput> {
    channels
        .iter()
        .enumerate()
        .map(|(index, channel)| ChannelInput {
            channel: channel.name.clone(),
            index,
            path: case_dir.join(format!("{}_{}", case_id, channel.suffix)),
        })
        .collect()
}

impl InferenceRequest {
    /// Request for one workflow of a case.
    ///
    /// The volume goes to `<output_root>/<workflow>` and inputs are staged in
    /// `<output_root>/.inputs/<workflow>`.
    pub fn for_workflow(
        case_id: &str,
        tracer: &str,
        workflow: &Workflow,
        case_dir: &Path,
        output_root: &Path,
    ) -> Self {
        Self {
            case_id: case_id.to_string(),
            tracer: tracer.to_string(),
            workflow: workflow.name.clone(),
            case_dir: case_dir.to_path_buf(),
            inputs: locate_inputs(case_dir, case_id, &workflow.channels),
            staging_dir: output_root.join(STAGING_DIR).join(&workflow.name),
            output_dir: output_root.join(&workflow.name),
        }
    }

    /// Fail on the first channel whose file is absent
    pub fn validate_inputs(&self) -> Result<(), InferenceError> {
        for input in &self.inputs {
            if !input.path.is_file() {
                return Err(InferenceError::MissingInput {
                    channel: input.channel.clone(),
                    path: input.path.clone(),
                });
            }
        }
        Ok(())
    }

    /// Place the workflow's inputs, and nothing else, in `staging_dir`.
    ///
    /// Files keep their `<case_id>_<suffix>` names and are hard-linked when
    /// possible, copied otherwise. Returns the staged paths in channel order.
    pub fn stage_inputs(&self) -> Result<Vec<PathBuf>, InferenceError> {
        if self.staging_dir.exists() {
            fs::remove_dir_all(&self.staging_dir).map_err(io_err(&self.staging_dir))?;
        }
        fs::create_dir_all(&self.staging_dir).map_err(io_err(&self.staging_dir))?;

        let mut staged = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let name = input.path.file_name().ok_or_else(|| InferenceError::MissingInput {
                channel: input.channel.clone(),
                path: input.path.clone(),
            })?;
            let target = self.staging_dir.join(name);
            if fs::hard_link(&input.path, &target).is_err() {
                fs::copy(&input.path, &target).map_err(io_err(&input.path))?;
            }
            staged.push(target);
        }

        debug!(
            "Staged {} inputs for {}/{} in {}",
            staged.len(),
            self.tracer,
            self.workflow,
            self.staging_dir.display()
        );
        Ok(staged)
    }

    /// Where a runner writing `<case_id><suffix>` puts the volume
    pub fn expected_output(&self, suffix: &str) -> PathBuf {
        self.output_dir.join(format!("{}{}", self.case_id, suffix))
    }
}

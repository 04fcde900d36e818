//! Parallel case runs

use crate::{Catalog, PipelineError, PipelineSettings};
use fallback::{Case, FallbackController, RunReport};
use inference_engine::{CommandRunner, SegmentationRunner};
use labeled_volume::VolumeFormat;
use rule_table::{CleanerEvaluator, RuleEvaluator};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, info_span, warn};
use uuid::Uuid;
use volume_cleaner::VolumeCleaner;

/// Outcome of one case in a batch
#[derive(Debug)]
pub struct CaseResult {
    pub case_id: String,
    pub run_id: Uuid,
    pub result: Result<RunReport, PipelineError>,
}

/// Runs independent cases concurrently.
///
/// Each case runs its fallback loop on the blocking pool; cases never share
/// volume files, so the only limit is `max_parallel`.
pub struct BatchRunner<R, E> {
    catalog: &'static Catalog,
    runner: Arc<R>,
    evaluator: Arc<E>,
    semaphore: Arc<Semaphore>,
}

impl BatchRunner<CommandRunner, CleanerEvaluator<VolumeFormat>> {
    /// Wire the external model runner and the mask cleaner from settings
    pub fn from_settings(settings: &PipelineSettings) -> Result<Self, PipelineError> {
        let catalog = Catalog::global(settings)?;
        let cleaner = VolumeCleaner::new(settings.volume_format, settings.cleaner.clone());
        Ok(Self::new(
            catalog,
            CommandRunner::new(settings.runner.clone()),
            CleanerEvaluator::new(cleaner),
            settings.max_parallel_cases,
        ))
    }
}

impl<R, E> BatchRunner<R, E>
where
    R: SegmentationRunner + Send + Sync + 'static,
    E: RuleEvaluator + Send + Sync + 'static,
{
    pub fn new(catalog: &'static Catalog, runner: R, evaluator: E, max_parallel: usize) -> Self {
        let max_parallel = max_parallel.max(1);
        info!("Creating batch runner: max_parallel={}", max_parallel);
        Self {
            catalog,
            runner: Arc::new(runner),
            evaluator: Arc::new(evaluator),
            semaphore: Arc::new(Semaphore::new(max_parallel)),
        }
    }

    /// Run every case; results come back in input order
    pub async fn run(&self, cases: Vec<Case>) -> Vec<CaseResult> {
        info!("Running batch of {} cases", cases.len());
        let mut handles = Vec::with_capacity(cases.len());

        for case in cases {
            let run_id = Uuid::new_v4();
            let case_id = case.case_id.clone();

            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    handles.push((case_id, run_id, None));
                    continue;
                }
            };

            let catalog = self.catalog;
            let runner = Arc::clone(&self.runner);
            let evaluator = Arc::clone(&self.evaluator);

            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let span = info_span!("case", %run_id, case_id = %case.case_id, tracer = %case.tracer);
                let _enter = span.enter();

                let controller =
                    FallbackController::new(catalog.registry(), catalog.rules(), &*runner, &*evaluator);
                controller.run(&case)
            });
            handles.push((case_id, run_id, Some(handle)));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (case_id, run_id, handle) in handles {
            let result = match handle {
                Some(handle) => match handle.await {
                    Ok(run) => run.map_err(PipelineError::from),
                    Err(e) => Err(PipelineError::Join(e.to_string())),
                },
                None => Err(PipelineError::Closed),
            };

            if let Err(e) = &result {
                warn!("Case {} failed: {}", case_id, e);
            }
            results.push(CaseResult {
                case_id,
                run_id,
                result,
            });
        }

        results
    }
}

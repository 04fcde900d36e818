//! Fallback loop

use crate::{Accepted, Attempt, FallbackError, FallbackState, RunOutcome, RunReport};
use inference_engine::{InferenceRequest, SegmentationRunner};
use metrics::counter;
use rule_table::{Action, RuleEvaluator, RuleTable};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use workflow_registry::{Workflow, WorkflowRegistry};

/// One input case to segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Case {
    pub case_id: String,
    pub tracer: String,
    /// Directory holding the `<case_id>_<suffix>` channel files
    pub input_dir: PathBuf,
    /// Each workflow writes into `<output_dir>/<workflow>`
    pub output_dir: PathBuf,
}

/// Result of a single state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: FallbackState,
    /// Set when the transition ran a workflow
    pub attempt: Option<Attempt>,
}

/// Drives the per-tracer fallback loop.
///
/// Workflows run strictly one after another; a workflow is only tried after
/// the previous one asked to continue. Inference failures abort the run,
/// only rule outcomes move the loop forward.
pub struct FallbackController<'a, R, E> {
    registry: &'a WorkflowRegistry,
    rules: &'a RuleTable,
    runner: R,
    evaluator: E,
}

impl<'a, R: SegmentationRunner, E: RuleEvaluator> FallbackController<'a, R, E> {
    pub fn new(registry: &'a WorkflowRegistry, rules: &'a RuleTable, runner: R, evaluator: E) -> Self {
        Self {
            registry,
            rules,
            runner,
            evaluator,
        }
    }

    /// Run the loop until a terminal state
    pub fn run(&self, case: &Case) -> Result<RunReport, FallbackError> {
        info!("Starting fallback run for case {} ({})", case.case_id, case.tracer);

        let mut attempts = Vec::new();
        let mut state = FallbackState::initial();

        while !state.is_terminal() {
            let transition = self.step(case, &state)?;
            attempts.extend(transition.attempt);
            state = transition.next;
        }

        let outcome = match state {
            FallbackState::Accepted(accepted) => RunOutcome::Accepted(accepted),
            _ => {
                counter!("fallback_exhausted_total", "tracer" => case.tracer.clone()).increment(1);
                warn!(
                    "No workflow produced an accepted result for case {} ({} attempts)",
                    case.case_id,
                    attempts.len()
                );
                RunOutcome::Exhausted
            }
        };

        Ok(RunReport {
            tracer: case.tracer.clone(),
            case_id: case.case_id.clone(),
            attempts,
            outcome,
        })
    }

    /// Apply one transition. Terminal states are returned unchanged.
    pub fn step(&self, case: &Case, state: &FallbackState) -> Result<Transition, FallbackError> {
        let index = match state {
            FallbackState::Pending(index) => *index,
            terminal => {
                return Ok(Transition {
                    next: terminal.clone(),
                    attempt: None,
                })
            }
        };

        let workflows = self.registry.workflows_for(&case.tracer)?;
        let Some(workflow) = workflows.get(index) else {
            return Ok(Transition {
                next: FallbackState::Exhausted,
                attempt: None,
            });
        };

        let volume = self.segment(case, workflow)?;

        let Some(rule) = self.rules.lookup(&case.tracer, &workflow.name) else {
            info!(
                "No rule for {}/{}, keeping {}",
                case.tracer,
                workflow.name,
                volume.display()
            );
            return Ok(Transition {
                next: FallbackState::Accepted(Accepted {
                    workflow: workflow.name.clone(),
                    target_label: workflow.target_label,
                    volume: volume.clone(),
                    outcome: true,
                    validated: false,
                }),
                attempt: Some(Attempt {
                    workflow: workflow.name.clone(),
                    volume,
                    outcome: None,
                    action: Action::Stop,
                }),
            });
        };

        let outcome = self
            .evaluator
            .evaluate(rule, &volume)
            .map_err(|source| FallbackError::Validation {
                workflow: workflow.name.clone(),
                source,
            })?;
        if !outcome {
            counter!("fallback_rule_rejections_total", "tracer" => case.tracer.clone()).increment(1);
        }

        let action = rule.action_for(outcome);
        let attempt = Attempt {
            workflow: workflow.name.clone(),
            volume: volume.clone(),
            outcome: Some(outcome),
            action,
        };

        let next = match action {
            Action::Stop => {
                if outcome {
                    info!("Workflow {} accepted for case {}", workflow.name, case.case_id);
                } else {
                    warn!(
                        "Workflow {} rejected for case {}, stopping without fallback",
                        workflow.name, case.case_id
                    );
                }
                FallbackState::Accepted(Accepted {
                    workflow: workflow.name.clone(),
                    target_label: workflow.target_label,
                    volume,
                    outcome,
                    validated: true,
                })
            }
            Action::Continue => {
                debug!(
                    "Workflow {} outcome={} for case {}, falling through",
                    workflow.name, outcome, case.case_id
                );
                FallbackState::Pending(index + 1)
            }
        };

        Ok(Transition {
            next,
            attempt: Some(attempt),
        })
    }

    fn segment(&self, case: &Case, workflow: &Workflow) -> Result<PathBuf, FallbackError> {
        let request = InferenceRequest::for_workflow(
            &case.case_id,
            &case.tracer,
            workflow,
            &case.input_dir,
            &case.output_dir,
        );

        counter!("fallback_inference_runs_total", "tracer" => case.tracer.clone()).increment(1);
        debug!(
            "Running workflow {} (priority {}) for case {}",
            workflow.name, workflow.priority, case.case_id
        );

        self.runner
            .segment(&request)
            .map_err(|source| FallbackError::Inference {
                workflow: workflow.name.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference_engine::InferenceError;
    use labeled_volume::{LabeledVolume, PostcardVolumeStore, SpatialMetadata, VolumeError, VolumeStore};
    use proptest::prelude::*;
    use rule_table::{CleanerEvaluator, Rule, RuleConfig, ValidatorKind};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::Path;
    use volume_cleaner::{CleanerConfig, VolumeCleaner};
    use workflow_registry::{ChannelConfig, TracerConfig, WorkflowConfig};

    /// Records calls and hands back `<output_dir>/<case_id>.lvol`
    #[derive(Default)]
    struct ScriptedRunner {
        calls: RefCell<Vec<String>>,
        requests: RefCell<Vec<InferenceRequest>>,
        fail_on: Option<String>,
        /// Blob size to write per workflow; nothing is written when absent
        blobs: HashMap<String, usize>,
    }

    impl SegmentationRunner for ScriptedRunner {
        fn segment(&self, request: &InferenceRequest) -> Result<PathBuf, InferenceError> {
            self.calls.borrow_mut().push(request.workflow.clone());
            self.requests.borrow_mut().push(request.clone());
            if self.fail_on.as_deref() == Some(request.workflow.as_str()) {
                return Err(InferenceError::ExitStatus {
                    code: Some(1),
                    stderr: "CUDA out of memory".to_string(),
                });
            }

            let path = request.expected_output(".lvol");
            if let Some(&size) = self.blobs.get(&request.workflow) {
                std::fs::create_dir_all(&request.output_dir).unwrap();
                let mut volume = LabeledVolume::zeros((24, 24, 24), SpatialMetadata::default());
                for i in 0..size {
                    volume.voxels[[12, 6 + i / 12, 6 + i % 12]] = 11;
                }
                PostcardVolumeStore::new().save(&path, &volume).unwrap();
            }
            Ok(path)
        }
    }

    /// Outcome per workflow, read from the volume's parent directory name
    struct ScriptedEvaluator {
        outcomes: HashMap<String, bool>,
    }

    impl RuleEvaluator for ScriptedEvaluator {
        fn evaluate(&self, _rule: &Rule, volume: &Path) -> Result<bool, VolumeError> {
            let workflow = volume
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(self.outcomes.get(&workflow).copied().unwrap_or(false))
        }
    }

    fn outcomes(pairs: &[(&str, bool)]) -> ScriptedEvaluator {
        ScriptedEvaluator {
            outcomes: pairs.iter().map(|(w, o)| (w.to_string(), *o)).collect(),
        }
    }

    fn registry(workflows: &[&str]) -> WorkflowRegistry {
        WorkflowRegistry::from_configs(vec![TracerConfig {
            name: "fdg".to_string(),
            reference_modality: "PT".to_string(),
            workflows: workflows
                .iter()
                .map(|name| WorkflowConfig {
                    name: name.to_string(),
                    target_label: Some(11),
                    channels: vec![ChannelConfig::new("PT", "0000.nii.gz")],
                })
                .collect(),
        }])
        .unwrap()
    }

    fn rule(workflow: &str, on_true: Action, on_false: Action) -> RuleConfig {
        RuleConfig {
            tracer: "fdg".to_string(),
            workflow: workflow.to_string(),
            validator: ValidatorKind::LabelAboveThreshold { threshold: 10 },
            action_on_true: on_true,
            action_on_false: on_false,
        }
    }

    fn case(dir: &Path) -> Case {
        Case {
            case_id: "case_001".to_string(),
            tracer: "fdg".to_string(),
            input_dir: dir.join("input"),
            output_dir: dir.join("output"),
        }
    }

    #[test]
    fn test_falls_through_to_second_workflow() {
        let registry = registry(&["a", "b"]);
        let rules = RuleTable::from_configs(
            vec![
                rule("a", Action::Stop, Action::Continue),
                rule("b", Action::Stop, Action::Continue),
            ],
            &registry,
        )
        .unwrap();
        let runner = ScriptedRunner::default();
        let controller = FallbackController::new(
            &registry,
            &rules,
            &runner,
            outcomes(&[("a", false), ("b", true)]),
        );

        let report = controller.run(&case(Path::new("/cases"))).unwrap();

        assert_eq!(*runner.calls.borrow(), vec!["a", "b"]);
        let accepted = report.outcome.accepted().unwrap();
        assert_eq!(accepted.workflow, "b");
        assert!(accepted.outcome);
        assert!(accepted.validated);
        assert_eq!(accepted.target_label, Some(11));
        assert_eq!(accepted.volume, PathBuf::from("/cases/output/b/case_001.lvol"));
        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.attempts[0].outcome, Some(false));
        assert_eq!(report.attempts[0].action, Action::Continue);
    }

    #[test]
    fn test_each_workflow_gets_only_its_channels() {
        let registry = WorkflowRegistry::from_configs(vec![TracerConfig {
            name: "fdg".to_string(),
            reference_modality: "PT".to_string(),
            workflows: vec![
                WorkflowConfig {
                    name: "pet_ct".to_string(),
                    target_label: Some(11),
                    channels: vec![
                        ChannelConfig::new("PT", "0000.nii.gz"),
                        ChannelConfig::new("CT", "0001.nii.gz"),
                    ],
                },
                WorkflowConfig {
                    name: "pet".to_string(),
                    target_label: Some(11),
                    channels: vec![ChannelConfig::new("PT", "0000.nii.gz")],
                },
            ],
        }])
        .unwrap();
        let rules = RuleTable::from_configs(
            vec![rule("pet_ct", Action::Stop, Action::Continue)],
            &registry,
        )
        .unwrap();
        let runner = ScriptedRunner::default();
        let controller =
            FallbackController::new(&registry, &rules, &runner, outcomes(&[("pet_ct", false)]));

        controller.run(&case(Path::new("/cases"))).unwrap();

        let requests = runner.requests.borrow();
        assert_eq!(requests.len(), 2);
        let pet_ct: Vec<&Path> = requests[0].inputs.iter().map(|i| i.path.as_path()).collect();
        assert_eq!(
            pet_ct,
            vec![
                Path::new("/cases/input/case_001_0000.nii.gz"),
                Path::new("/cases/input/case_001_0001.nii.gz"),
            ]
        );
        assert_eq!(requests[1].inputs.len(), 1);
        assert_eq!(requests[1].inputs[0].channel, "PT");
        assert_eq!(requests[1].staging_dir, PathBuf::from("/cases/output/.inputs/pet"));
        assert_eq!(requests[1].output_dir, PathBuf::from("/cases/output/pet"));
    }

    #[test]
    fn test_stop_regardless_of_outcome() {
        for outcome in [true, false] {
            let registry = registry(&["a", "b"]);
            let rules =
                RuleTable::from_configs(vec![rule("a", Action::Stop, Action::Stop)], &registry).unwrap();
            let runner = ScriptedRunner::default();
            let controller =
                FallbackController::new(&registry, &rules, &runner, outcomes(&[("a", outcome)]));

            let report = controller.run(&case(Path::new("/cases"))).unwrap();

            assert_eq!(*runner.calls.borrow(), vec!["a"]);
            let accepted = report.outcome.accepted().unwrap();
            assert_eq!(accepted.workflow, "a");
            assert_eq!(accepted.outcome, outcome);
            assert_eq!(report.outcome.has_finding(), outcome);
        }
    }

    #[test]
    fn test_exhausted_when_every_workflow_continues() {
        let registry = registry(&["a", "b", "c"]);
        let rules = RuleTable::from_configs(
            vec![
                rule("a", Action::Continue, Action::Continue),
                rule("b", Action::Stop, Action::Continue),
                rule("c", Action::Continue, Action::Stop),
            ],
            &registry,
        )
        .unwrap();
        let runner = ScriptedRunner::default();
        let controller = FallbackController::new(
            &registry,
            &rules,
            &runner,
            outcomes(&[("a", true), ("b", false), ("c", true)]),
        );

        let report = controller.run(&case(Path::new("/cases"))).unwrap();

        assert_eq!(report.outcome, RunOutcome::Exhausted);
        assert_eq!(*runner.calls.borrow(), vec!["a", "b", "c"]);
        assert_eq!(report.attempts.len(), 3);
    }

    #[test]
    fn test_missing_rule_is_trusted() {
        let registry = registry(&["a", "b"]);
        let rules = RuleTable::default();
        let runner = ScriptedRunner::default();
        let controller = FallbackController::new(&registry, &rules, &runner, outcomes(&[]));

        let report = controller.run(&case(Path::new("/cases"))).unwrap();

        assert_eq!(*runner.calls.borrow(), vec!["a"]);
        let accepted = report.outcome.accepted().unwrap();
        assert!(accepted.outcome);
        assert!(!accepted.validated);
        assert_eq!(report.attempts[0].outcome, None);
    }

    #[test]
    fn test_inference_failure_aborts_without_fallback() {
        let registry = registry(&["a", "b"]);
        let rules = RuleTable::from_configs(
            vec![rule("a", Action::Continue, Action::Continue)],
            &registry,
        )
        .unwrap();
        let runner = ScriptedRunner {
            fail_on: Some("a".to_string()),
            ..Default::default()
        };
        let controller = FallbackController::new(&registry, &rules, &runner, outcomes(&[]));

        let result = controller.run(&case(Path::new("/cases")));

        assert!(matches!(result, Err(FallbackError::Inference { ref workflow, .. }) if workflow == "a"));
        assert_eq!(*runner.calls.borrow(), vec!["a"]);
    }

    #[test]
    fn test_unknown_tracer() {
        let registry = registry(&["a"]);
        let rules = RuleTable::default();
        let runner = ScriptedRunner::default();
        let controller = FallbackController::new(&registry, &rules, &runner, outcomes(&[]));

        let mut psma = case(Path::new("/cases"));
        psma.tracer = "psma".to_string();

        assert!(matches!(
            controller.run(&psma),
            Err(FallbackError::Configuration(_))
        ));
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn test_step_on_terminal_state_does_nothing() {
        let registry = registry(&["a"]);
        let rules = RuleTable::default();
        let runner = ScriptedRunner::default();
        let controller = FallbackController::new(&registry, &rules, &runner, outcomes(&[]));
        let case = case(Path::new("/cases"));

        let transition = controller.step(&case, &FallbackState::Exhausted).unwrap();
        assert_eq!(transition.next, FallbackState::Exhausted);
        assert!(transition.attempt.is_none());

        let transition = controller.step(&case, &FallbackState::Pending(5)).unwrap();
        assert_eq!(transition.next, FallbackState::Exhausted);
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn test_with_cleaner_on_real_volumes() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&["pet_ct", "pet"]);
        let rules = RuleTable::from_configs(
            vec![
                rule("pet_ct", Action::Stop, Action::Continue),
                rule("pet", Action::Stop, Action::Stop),
            ],
            &registry,
        )
        .unwrap();
        let runner = ScriptedRunner {
            blobs: [("pet_ct".to_string(), 8), ("pet".to_string(), 15)]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        let config = CleanerConfig {
            margin_scaling_factor: 0,
            ..Default::default()
        };
        let evaluator = CleanerEvaluator::new(VolumeCleaner::new(PostcardVolumeStore::new(), config));
        let controller = FallbackController::new(&registry, &rules, &runner, evaluator);

        let report = controller.run(&case(dir.path())).unwrap();

        let accepted = report.outcome.accepted().unwrap();
        assert_eq!(accepted.workflow, "pet");
        assert!(accepted.outcome);

        let store = PostcardVolumeStore::new();
        assert!(store.load(&report.attempts[0].volume).unwrap().is_empty());
        assert_eq!(store.load(&accepted.volume).unwrap().non_zero_count(), 15);
    }

    #[test]
    fn test_unreadable_volume_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&["a"]);
        let rules =
            RuleTable::from_configs(vec![rule("a", Action::Stop, Action::Stop)], &registry).unwrap();
        let runner = ScriptedRunner::default();
        let evaluator = CleanerEvaluator::new(VolumeCleaner::new(
            PostcardVolumeStore::new(),
            CleanerConfig::default(),
        ));
        let controller = FallbackController::new(&registry, &rules, &runner, evaluator);

        assert!(matches!(
            controller.run(&case(dir.path())),
            Err(FallbackError::Validation { .. })
        ));
    }

    fn arb_action() -> impl Strategy<Value = Action> {
        prop_oneof![Just(Action::Stop), Just(Action::Continue)]
    }

    proptest! {
        #[test]
        fn prop_runs_until_first_stop(
            plan in proptest::collection::vec((any::<bool>(), arb_action(), arb_action()), 1..6)
        ) {
            let names: Vec<String> = (0..plan.len()).map(|i| format!("w{}", i)).collect();
            let name_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
            let registry = registry(&name_refs);
            let rules = RuleTable::from_configs(
                plan.iter()
                    .zip(&names)
                    .map(|((_, on_true, on_false), name)| rule(name, *on_true, *on_false))
                    .collect(),
                &registry,
            )
            .unwrap();
            let evaluator = ScriptedEvaluator {
                outcomes: plan.iter().zip(&names).map(|((o, _, _), n)| (n.clone(), *o)).collect(),
            };
            let runner = ScriptedRunner::default();
            let controller = FallbackController::new(&registry, &rules, &runner, evaluator);

            let report = controller.run(&case(Path::new("/cases"))).unwrap();

            let first_stop = plan.iter().position(|(outcome, on_true, on_false)| {
                (if *outcome { *on_true } else { *on_false }) == Action::Stop
            });
            match first_stop {
                Some(index) => {
                    prop_assert_eq!(runner.calls.borrow().len(), index + 1);
                    let accepted = report.outcome.accepted().unwrap();
                    prop_assert_eq!(&accepted.workflow, &names[index]);
                    prop_assert_eq!(accepted.outcome, plan[index].0);
                }
                None => {
                    prop_assert_eq!(runner.calls.borrow().len(), plan.len());
                    prop_assert_eq!(&report.outcome, &RunOutcome::Exhausted);
                }
            }
            prop_assert_eq!(&*runner.calls.borrow(), &names[..runner.calls.borrow().len()]);
        }
    }
}

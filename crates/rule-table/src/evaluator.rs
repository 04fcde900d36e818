//! Rule evaluation

use crate::{Rule, ValidatorKind};
use labeled_volume::{VolumeError, VolumeStore};
use std::path::Path;
use tracing::debug;
use volume_cleaner::VolumeCleaner;

/// Decides whether a persisted volume is acceptable.
///
/// Implementations may rewrite the volume while deciding.
pub trait VolumeValidator {
    fn evaluate(&self, volume: &Path) -> Result<bool, VolumeError>;
}

/// Evaluates a rule against the volume a workflow produced
pub trait RuleEvaluator {
    fn evaluate(&self, rule: &Rule, volume: &Path) -> Result<bool, VolumeError>;
}

impl<E: RuleEvaluator + ?Sized> RuleEvaluator for &E {
    fn evaluate(&self, rule: &Rule, volume: &Path) -> Result<bool, VolumeError> {
        (**self).evaluate(rule, volume)
    }
}

/// Cleaner bound to a significance threshold
pub struct ThresholdValidator<'a, S> {
    cleaner: &'a VolumeCleaner<S>,
    threshold: usize,
}

impl<'a, S: VolumeStore> ThresholdValidator<'a, S> {
    pub fn new(cleaner: &'a VolumeCleaner<S>, threshold: usize) -> Self {
        Self { cleaner, threshold }
    }
}

impl<S: VolumeStore> VolumeValidator for ThresholdValidator<'_, S> {
    fn evaluate(&self, volume: &Path) -> Result<bool, VolumeError> {
        self.cleaner.clean(volume, self.threshold)
    }
}

impl ValidatorKind {
    /// Bind this validator's parameters to a cleaner
    pub fn bind<'a, S: VolumeStore + 'a>(
        &self,
        cleaner: &'a VolumeCleaner<S>,
    ) -> Box<dyn VolumeValidator + 'a> {
        match self {
            ValidatorKind::LabelAboveThreshold { threshold } => {
                Box::new(ThresholdValidator::new(cleaner, *threshold as usize))
            }
        }
    }
}

/// Production evaluator dispatching every validator kind to the cleaner
pub struct CleanerEvaluator<S> {
    cleaner: VolumeCleaner<S>,
}

impl<S: VolumeStore> CleanerEvaluator<S> {
    pub fn new(cleaner: VolumeCleaner<S>) -> Self {
        Self { cleaner }
    }

    pub fn cleaner(&self) -> &VolumeCleaner<S> {
        &self.cleaner
    }
}

impl<S: VolumeStore> RuleEvaluator for CleanerEvaluator<S> {
    fn evaluate(&self, rule: &Rule, volume: &Path) -> Result<bool, VolumeError> {
        debug!("Evaluating {:?} on {}", rule.validator, volume.display());
        rule.validator.bind(&self.cleaner).evaluate(volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Action;
    use labeled_volume::{LabeledVolume, PostcardVolumeStore, SpatialMetadata};
    use volume_cleaner::CleanerConfig;

    fn write_blob(path: &Path, voxels: usize) {
        let mut volume = LabeledVolume::zeros((20, 20, 20), SpatialMetadata::default());
        for i in 0..voxels {
            volume.voxels[[10, 10, i]] = 1;
        }
        PostcardVolumeStore::new().save(path, &volume).unwrap();
    }

    fn evaluator() -> CleanerEvaluator<PostcardVolumeStore> {
        let config = CleanerConfig {
            margin_scaling_factor: 0,
            ..Default::default()
        };
        CleanerEvaluator::new(VolumeCleaner::new(PostcardVolumeStore::new(), config))
    }

    #[test]
    fn test_threshold_rule_dispatches_to_cleaner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.lvol");
        let rule = Rule::new(
            ValidatorKind::LabelAboveThreshold { threshold: 5 },
            Action::Stop,
            Action::Continue,
        );

        write_blob(&path, 6);
        assert!(evaluator().evaluate(&rule, &path).unwrap());

        write_blob(&path, 4);
        assert!(!evaluator().evaluate(&rule, &path).unwrap());
        let flushed = PostcardVolumeStore::new().load(&path).unwrap();
        assert!(flushed.is_empty());
    }

    #[test]
    fn test_bound_validator() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.lvol");
        write_blob(&path, 3);

        let evaluator = evaluator();
        let validator = ValidatorKind::LabelAboveThreshold { threshold: 3 }.bind(evaluator.cleaner());
        assert!(validator.evaluate(&path).unwrap());
    }
}

//! Mask cleaning and significance decision

use crate::{label_components, CleanerConfig};
use labeled_volume::{VolumeError, VolumeStore};
use ndarray::{Array3, Axis, Slice, Zip};
use std::path::Path;
use tracing::{debug, info};

/// Outcome of cleaning one label array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanReport {
    /// Border width that was zeroed
    pub margin: usize,
    /// Components present after the border flush
    pub components_found: usize,
    /// Components dropped for being smaller than the threshold
    pub components_removed: usize,
    /// Foreground voxels left after size filtering (before any final flush)
    pub kept_voxels: usize,
    /// Whether the mask holds a significant finding
    pub accepted: bool,
}

/// Zero `margin` voxels on both ends of every axis.
///
/// A margin at least as long as an axis clears the whole array.
pub fn border_flush(voxels: &mut Array3<u16>, margin: usize) {
    if margin == 0 {
        return;
    }

    for axis in 0..3 {
        let len = voxels.len_of(Axis(axis));
        let width = margin.min(len);
        voxels
            .slice_axis_mut(Axis(axis), Slice::from(0..width))
            .fill(0);
        voxels
            .slice_axis_mut(Axis(axis), Slice::from(len - width..len))
            .fill(0);
    }
}

/// Clean a label array in place and decide whether it is significant.
///
/// Steps: border flush of `factor * threshold` voxels, removal of every
/// component smaller than `threshold`, then a full flush if fewer than
/// `threshold` foreground voxels survive.
pub fn clean_array(
    voxels: &mut Array3<u16>,
    threshold: usize,
    config: &CleanerConfig,
) -> Result<CleanReport, VolumeError> {
    if threshold == 0 {
        return Err(VolumeError::InvalidThreshold);
    }

    let margin = config.margin_for(threshold);
    border_flush(voxels, margin);

    let components = label_components(voxels, config.connectivity);
    let components_removed = components.sizes.iter().filter(|&&s| s < threshold).count();

    Zip::from(&mut *voxels)
        .and(&components.labels)
        .for_each(|value, &id| {
            if id != 0 && components.size_of(id) < threshold {
                *value = 0;
            }
        });

    let kept_voxels = voxels.iter().filter(|&&v| v != 0).count();
    let accepted = kept_voxels >= threshold;
    if !accepted {
        voxels.fill(0);
    }

    debug!(
        "Cleaned mask: margin={}, components={}, removed={}, kept={}",
        margin,
        components.count(),
        components_removed,
        kept_voxels
    );

    Ok(CleanReport {
        margin,
        components_found: components.count(),
        components_removed,
        kept_voxels,
        accepted,
    })
}

/// Cleans persisted masks in place.
///
/// `clean` has a two-part contract: the returned flag says whether a
/// significant finding remains, and the file at `path` is always rewritten
/// with the matching content (the cleaned mask when `true`, an all-zero mask
/// when `false`). Spatial metadata is carried over unchanged.
pub struct VolumeCleaner<S> {
    store: S,
    config: CleanerConfig,
}

impl<S: VolumeStore> VolumeCleaner<S> {
    /// Create a cleaner over a volume store
    pub fn new(store: S, config: CleanerConfig) -> Self {
        Self { store, config }
    }

    /// Get the configuration
    pub fn config(&self) -> &CleanerConfig {
        &self.config
    }

    /// Get the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Clean the mask at `path` and overwrite it
    pub fn clean(&self, path: &Path, threshold: usize) -> Result<bool, VolumeError> {
        let mut volume = self.store.load(path)?;
        let report = clean_array(&mut volume.voxels, threshold, &self.config)?;

        info!(
            "Number of non-zero voxels after clearing a margin of {} voxels and connected component analysis: {}",
            report.margin, report.kept_voxels
        );

        if report.accepted {
            info!(
                "Mask {} has at least {} non-zero voxels, saving the cleaned mask",
                path.display(),
                threshold
            );
        } else {
            info!(
                "Mask {} has less than {} non-zero voxels, flushing the mask with zero",
                path.display(),
                threshold
            );
        }

        self.store.save(path, &volume)?;
        Ok(report.accepted)
    }
}

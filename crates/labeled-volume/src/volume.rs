//! Volume and spatial metadata types

use crate::VolumeError;
use ndarray::Array3;
use serde::{Deserialize, Serialize};

/// Physical placement of a voxel grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialMetadata {
    /// World coordinates of the first voxel (mm)
    pub origin: [f64; 3],
    /// Voxel size along each axis (mm)
    pub spacing: [f64; 3],
    /// Row-major 3x3 direction cosine matrix
    pub direction: [f64; 9],
}

impl Default for SpatialMetadata {
    fn default() -> Self {
        Self {
            origin: [0.0; 3],
            spacing: [1.0; 3],
            direction: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// A labeled 3D array, zero being background
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledVolume {
    /// Label values indexed (z, y, x)
    pub voxels: Array3<u16>,
    /// Spatial placement, carried unchanged through cleaning
    pub metadata: SpatialMetadata,
}

impl LabeledVolume {
    /// Wrap an existing label array
    pub fn new(voxels: Array3<u16>, metadata: SpatialMetadata) -> Self {
        Self { voxels, metadata }
    }

    /// Create an all-background volume
    pub fn zeros(shape: (usize, usize, usize), metadata: SpatialMetadata) -> Self {
        Self::new(Array3::zeros(shape), metadata)
    }

    /// Build a volume from voxels in standard (C) order
    pub fn from_voxels(
        shape: [usize; 3],
        voxels: Vec<u16>,
        metadata: SpatialMetadata,
    ) -> Result<Self, VolumeError> {
        let array = Array3::from_shape_vec((shape[0], shape[1], shape[2]), voxels)
            .map_err(|e| VolumeError::Shape(e.to_string()))?;
        Ok(Self::new(array, metadata))
    }

    /// Array extent as `[z, y, x]`
    pub fn shape(&self) -> [usize; 3] {
        let (z, y, x) = self.voxels.dim();
        [z, y, x]
    }

    /// Number of foreground voxels
    pub fn non_zero_count(&self) -> usize {
        self.voxels.iter().filter(|&&v| v != 0).count()
    }

    /// True when no voxel is labeled
    pub fn is_empty(&self) -> bool {
        self.voxels.iter().all(|&v| v == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_zero_count_and_is_empty() {
        let mut volume = LabeledVolume::zeros((3, 3, 3), SpatialMetadata::default());
        assert!(volume.is_empty());

        volume.voxels[[0, 0, 0]] = 1;
        volume.voxels[[2, 2, 2]] = 7;
        assert_eq!(volume.non_zero_count(), 2);
        assert!(!volume.is_empty());
    }

    #[test]
    fn test_from_voxels_rejects_bad_shape() {
        let result = LabeledVolume::from_voxels([2, 2, 2], vec![0; 7], SpatialMetadata::default());
        assert!(matches!(result, Err(VolumeError::Shape(_))));
    }
}

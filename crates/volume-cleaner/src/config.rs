//! Cleaner configuration

use serde::{Deserialize, Serialize};

/// Border margin, in voxels, per unit of threshold
pub const DEFAULT_MARGIN_SCALING_FACTOR: usize = 3;

/// Voxel adjacency used when grouping foreground into components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// Face neighbors only
    Six,
    /// Face, edge and corner neighbors
    #[default]
    TwentySix,
}

impl Connectivity {
    /// Neighbor offsets as `[dz, dy, dx]`
    pub fn offsets(self) -> Vec<[isize; 3]> {
        let mut offsets = Vec::with_capacity(26);
        for dz in -1isize..=1 {
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    let steps = dz.abs() + dy.abs() + dx.abs();
                    let adjacent = match self {
                        Connectivity::Six => steps == 1,
                        Connectivity::TwentySix => steps >= 1,
                    };
                    if adjacent {
                        offsets.push([dz, dy, dx]);
                    }
                }
            }
        }
        offsets
    }
}

/// Cleaner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    /// Border margin = factor * threshold (0 disables the border flush)
    pub margin_scaling_factor: usize,
    /// Component adjacency
    pub connectivity: Connectivity,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            margin_scaling_factor: DEFAULT_MARGIN_SCALING_FACTOR,
            connectivity: Connectivity::default(),
        }
    }
}

impl CleanerConfig {
    /// Border width for a given threshold
    pub fn margin_for(&self, threshold: usize) -> usize {
        self.margin_scaling_factor.saturating_mul(threshold)
    }
}

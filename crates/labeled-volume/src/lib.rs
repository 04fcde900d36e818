//! Labeled Segmentation Volumes
//!
//! Provides the 3D label array produced by segmentation, its spatial
//! metadata, and the stores used to read and overwrite it on disk
//! (NIfTI for model output, a postcard record for internal use).

mod nifti_store;
mod store;
mod volume;

pub use nifti_store::NiftiVolumeStore;
pub use store::{PostcardVolumeStore, VolumeFormat, VolumeStore, FORMAT_VERSION};
pub use volume::{LabeledVolume, SpatialMetadata};

use std::path::PathBuf;
use thiserror::Error;

/// Errors while reading, writing or reshaping a volume
#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to decode volume {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("Failed to encode volume: {0}")]
    Encode(String),
    #[error("Invalid volume shape: {0}")]
    Shape(String),
    #[error("Threshold must be a positive voxel count")]
    InvalidThreshold,
}

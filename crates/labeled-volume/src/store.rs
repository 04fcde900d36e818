//! Volume persistence

use crate::{LabeledVolume, SpatialMetadata, VolumeError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::nifti_store::NiftiVolumeStore;

/// Current on-disk format version
pub const FORMAT_VERSION: u16 = 1;

/// Reads and overwrites persisted volumes.
///
/// Implementations must leave readers either the old or the new content of
/// `path`, never a partial write. Callers own exclusive access to a path for
/// the duration of a load/save pair.
pub trait VolumeStore {
    /// Read the volume stored at `path`
    fn load(&self, path: &Path) -> Result<LabeledVolume, VolumeError>;

    /// Overwrite `path` with `volume`
    fn save(&self, path: &Path, volume: &LabeledVolume) -> Result<(), VolumeError>;
}

impl<S: VolumeStore + ?Sized> VolumeStore for &S {
    fn load(&self, path: &Path) -> Result<LabeledVolume, VolumeError> {
        (**self).load(path)
    }

    fn save(&self, path: &Path, volume: &LabeledVolume) -> Result<(), VolumeError> {
        (**self).save(path, volume)
    }
}

/// Sibling path a save writes to before renaming over `path`.
///
/// The file name keeps its extensions so format detection still applies.
pub(crate) fn temp_path(path: &Path) -> Result<PathBuf, VolumeError> {
    let name = path.file_name().ok_or_else(|| VolumeError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file path"),
    })?;
    let mut tmp = std::ffi::OsString::from(".tmp.");
    tmp.push(name);
    Ok(path.with_file_name(tmp))
}

/// On-disk volume format, selectable in settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeFormat {
    /// Pick by file extension: `.nii`/`.nii.gz` are NIfTI, anything else postcard
    #[default]
    Auto,
    Nifti,
    Postcard,
}

impl VolumeFormat {
    /// Concrete format used for `path`
    pub fn resolve(self, path: &Path) -> VolumeFormat {
        match self {
            VolumeFormat::Auto if is_nifti_path(path) => VolumeFormat::Nifti,
            VolumeFormat::Auto => VolumeFormat::Postcard,
            other => other,
        }
    }
}

fn is_nifti_path(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    name.ends_with(".nii") || name.ends_with(".nii.gz")
}

impl VolumeStore for VolumeFormat {
    fn load(&self, path: &Path) -> Result<LabeledVolume, VolumeError> {
        match self.resolve(path) {
            VolumeFormat::Nifti => NiftiVolumeStore::new().load(path),
            _ => PostcardVolumeStore::new().load(path),
        }
    }

    fn save(&self, path: &Path, volume: &LabeledVolume) -> Result<(), VolumeError> {
        match self.resolve(path) {
            VolumeFormat::Nifti => NiftiVolumeStore::new().save(path, volume),
            _ => PostcardVolumeStore::new().save(path, volume),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct VolumeRecord {
    format_version: u16,
    metadata: SpatialMetadata,
    shape: [usize; 3],
    voxels: Vec<u16>,
}

/// Postcard-encoded volume files
#[derive(Debug, Clone, Copy, Default)]
pub struct PostcardVolumeStore;

impl PostcardVolumeStore {
    pub fn new() -> Self {
        Self
    }
}

impl VolumeStore for PostcardVolumeStore {
    fn load(&self, path: &Path) -> Result<LabeledVolume, VolumeError> {
        let bytes = fs::read(path).map_err(|source| VolumeError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let record: VolumeRecord =
            postcard::from_bytes(&bytes).map_err(|e| VolumeError::Decode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if record.format_version != FORMAT_VERSION {
            return Err(VolumeError::Decode {
                path: path.to_path_buf(),
                reason: format!("unsupported format version {}", record.format_version),
            });
        }

        let expected = record
            .shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| VolumeError::Decode {
                path: path.to_path_buf(),
                reason: format!("shape {:?} overflows the voxel count", record.shape),
            })?;
        if expected != record.voxels.len() {
            return Err(VolumeError::Decode {
                path: path.to_path_buf(),
                reason: format!(
                    "shape {:?} needs {} voxels, found {}",
                    record.shape,
                    expected,
                    record.voxels.len()
                ),
            });
        }

        debug!("Loaded volume {} with shape {:?}", path.display(), record.shape);
        LabeledVolume::from_voxels(record.shape, record.voxels, record.metadata)
    }

    fn save(&self, path: &Path, volume: &LabeledVolume) -> Result<(), VolumeError> {
        let record = VolumeRecord {
            format_version: FORMAT_VERSION,
            metadata: volume.metadata,
            shape: volume.shape(),
            voxels: volume.voxels.iter().copied().collect(),
        };
        let bytes = postcard::to_allocvec(&record).map_err(|e| VolumeError::Encode(e.to_string()))?;

        let tmp = temp_path(path)?;
        fs::write(&tmp, &bytes).map_err(|source| VolumeError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, path).map_err(|source| VolumeError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("Saved volume {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

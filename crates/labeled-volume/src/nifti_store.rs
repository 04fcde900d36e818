//! NIfTI-1 volume files
//!
//! Voxels are stored (x, y, z) on disk and exposed (z, y, x) in memory. The
//! file's affine is RAS while `SpatialMetadata` is LPS, matching the
//! convention of the scanners' DICOM geometry.

use crate::store::temp_path;
use crate::{LabeledVolume, SpatialMetadata, VolumeError, VolumeStore};
use ndarray::Array3;
use ndarray_nifti::{Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Sign flip between NIfTI world axes and metadata world axes
const RAS_TO_LPS: [f64; 3] = [-1.0, -1.0, 1.0];

/// NIfTI (`.nii`, `.nii.gz`) volume files.
///
/// Saving over an existing file reuses that file's header, so everything the
/// model runner wrote (qform, sform, units, description) survives a clean.
#[derive(Debug, Clone, Copy, Default)]
pub struct NiftiVolumeStore;

impl NiftiVolumeStore {
    pub fn new() -> Self {
        Self
    }
}

fn decode_error(path: &Path, err: nifti::NiftiError) -> VolumeError {
    VolumeError::Decode {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

impl VolumeStore for NiftiVolumeStore {
    fn load(&self, path: &Path) -> Result<LabeledVolume, VolumeError> {
        fs::metadata(path).map_err(|source| VolumeError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let object = ReaderOptions::new()
            .read_file(path)
            .map_err(|e| decode_error(path, e))?;
        let metadata = metadata_from_header(object.header());
        let array = object
            .into_volume()
            .into_ndarray::<u16>()
            .map_err(|e| decode_error(path, e))?;

        let shape = array.shape().to_vec();
        let array = match shape.as_slice() {
            [_, _, _] => array,
            [_, _, _, 1] => array.index_axis_move(Axis(3), 0),
            other => {
                return Err(VolumeError::Shape(format!(
                    "{} has shape {:?}, expected three spatial axes",
                    path.display(),
                    other
                )))
            }
        };
        let array = array
            .into_dimensionality::<Ix3>()
            .map_err(|e| VolumeError::Shape(e.to_string()))?;

        let (nx, ny, nz) = array.dim();
        let voxels = Array3::from_shape_fn((nz, ny, nx), |(z, y, x)| array[[x, y, z]]);

        debug!("Loaded NIfTI volume {} with shape {:?}", path.display(), [nz, ny, nx]);
        Ok(LabeledVolume::new(voxels, metadata))
    }

    fn save(&self, path: &Path, volume: &LabeledVolume) -> Result<(), VolumeError> {
        let mut header = if path.exists() {
            NiftiHeader::from_file(path).map_err(|e| decode_error(path, e))?
        } else {
            NiftiHeader::default()
        };
        if metadata_from_header(&header) != volume.metadata {
            apply_metadata(&mut header, &volume.metadata);
        }
        // Labels are written raw
        header.scl_slope = 1.0;
        header.scl_inter = 0.0;

        let (nz, ny, nx) = volume.voxels.dim();
        let data =
            ndarray_nifti::Array3::from_shape_fn((nx, ny, nz), |(x, y, z)| volume.voxels[[z, y, x]]);

        let tmp = temp_path(path)?;
        WriterOptions::new(&tmp)
            .reference_header(&header)
            .write_nifti(&data)
            .map_err(|e| VolumeError::Encode(e.to_string()))?;
        fs::rename(&tmp, path).map_err(|source| VolumeError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("Saved NIfTI volume {}", path.display());
        Ok(())
    }
}

/// Spatial metadata encoded by a header: qform first, then sform, then
/// bare voxel sizes.
fn metadata_from_header(header: &NiftiHeader) -> SpatialMetadata {
    let pixdim = |i: usize| {
        let v = f64::from(header.pixdim[i]).abs();
        if v > 0.0 {
            v
        } else {
            1.0
        }
    };

    let mut rotation = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    let mut spacing = [pixdim(1), pixdim(2), pixdim(3)];
    let mut origin = [0.0; 3];

    if header.qform_code > 0 {
        let b = f64::from(header.quatern_b);
        let c = f64::from(header.quatern_c);
        let d = f64::from(header.quatern_d);
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        rotation = [
            [a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), qfac * 2.0 * (b * d + a * c)],
            [2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, qfac * 2.0 * (c * d - a * b)],
            [2.0 * (b * d - a * c), 2.0 * (c * d + a * b), qfac * (a * a + d * d - b * b - c * c)],
        ];
        origin = [
            f64::from(header.quatern_x),
            f64::from(header.quatern_y),
            f64::from(header.quatern_z),
        ];
    } else if header.sform_code > 0 {
        let rows = [header.srow_x, header.srow_y, header.srow_z];
        for col in 0..3 {
            let norm = rows
                .iter()
                .map(|row| f64::from(row[col]).powi(2))
                .sum::<f64>()
                .sqrt();
            if norm > 0.0 {
                spacing[col] = norm;
                for (r, row) in rows.iter().enumerate() {
                    rotation[r][col] = f64::from(row[col]) / norm;
                }
            }
        }
        origin = [f64::from(rows[0][3]), f64::from(rows[1][3]), f64::from(rows[2][3])];
    }

    let mut direction = [0.0; 9];
    for r in 0..3 {
        for c in 0..3 {
            direction[r * 3 + c] = RAS_TO_LPS[r] * rotation[r][c];
        }
        origin[r] *= RAS_TO_LPS[r];
    }

    SpatialMetadata {
        origin,
        spacing,
        direction,
    }
}

/// Encode `metadata` as the header's sform, dropping any qform.
fn apply_metadata(header: &mut NiftiHeader, metadata: &SpatialMetadata) {
    let rows = [&mut header.srow_x, &mut header.srow_y, &mut header.srow_z];
    for (r, row) in rows.into_iter().enumerate() {
        for c in 0..3 {
            row[c] = (RAS_TO_LPS[r] * metadata.direction[r * 3 + c] * metadata.spacing[c]) as f32;
        }
        row[3] = (RAS_TO_LPS[r] * metadata.origin[r]) as f32;
    }
    for (c, spacing) in metadata.spacing.iter().enumerate() {
        header.pixdim[c + 1] = *spacing as f32;
    }
    if header.pixdim[0] == 0.0 {
        header.pixdim[0] = 1.0;
    }
    header.sform_code = 1;
    header.qform_code = 0;
}

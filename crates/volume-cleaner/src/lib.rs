//! Segmentation Mask Cleaning
//!
//! Suppresses border artifacts and small connected components in a labeled
//! volume, then decides whether anything significant remains.

mod cleaner;
mod components;
mod config;

pub use cleaner::{border_flush, clean_array, CleanReport, VolumeCleaner};
pub use components::{label_components, Components};
pub use config::{CleanerConfig, Connectivity, DEFAULT_MARGIN_SCALING_FACTOR};
pub use labeled_volume::VolumeError;

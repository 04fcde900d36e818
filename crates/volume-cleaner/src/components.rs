//! 3D connected-component labeling

use crate::Connectivity;
use ndarray::Array3;
use std::collections::VecDeque;

/// Result of labeling the foreground of a volume
#[derive(Debug, Clone)]
pub struct Components {
    /// Component id per voxel; 0 is background, ids start at 1
    pub labels: Array3<u32>,
    /// Voxel count of component `id` at index `id - 1`
    pub sizes: Vec<usize>,
}

impl Components {
    /// Number of components found
    pub fn count(&self) -> usize {
        self.sizes.len()
    }

    /// Voxel count of a component, 0 for background or unknown ids
    pub fn size_of(&self, id: u32) -> usize {
        match id {
            0 => 0,
            id => self.sizes.get(id as usize - 1).copied().unwrap_or(0),
        }
    }
}

/// Label every connected group of non-zero voxels.
///
/// Different label values touching each other belong to the same component:
/// only foreground vs. background matters.
pub fn label_components(voxels: &Array3<u16>, connectivity: Connectivity) -> Components {
    let (depth, height, width) = voxels.dim();
    let offsets = connectivity.offsets();
    let mut labels = Array3::<u32>::zeros((depth, height, width));
    let mut sizes = Vec::new();
    let mut queue = VecDeque::new();

    for ((z, y, x), &value) in voxels.indexed_iter() {
        if value == 0 || labels[[z, y, x]] != 0 {
            continue;
        }

        let id = sizes.len() as u32 + 1;
        let mut size = 0usize;
        labels[[z, y, x]] = id;
        queue.push_back([z, y, x]);

        while let Some([cz, cy, cx]) = queue.pop_front() {
            size += 1;
            for [dz, dy, dx] in &offsets {
                let nz = cz as isize + dz;
                let ny = cy as isize + dy;
                let nx = cx as isize + dx;
                if nz < 0
                    || ny < 0
                    || nx < 0
                    || nz >= depth as isize
                    || ny >= height as isize
                    || nx >= width as isize
                {
                    continue;
                }

                let neighbor = [nz as usize, ny as usize, nx as usize];
                if voxels[neighbor] != 0 && labels[neighbor] == 0 {
                    labels[neighbor] = id;
                    queue.push_back(neighbor);
                }
            }
        }

        sizes.push(size);
    }

    Components { labels, sizes }
}

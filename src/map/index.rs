//! Integer grid indices and world-to-grid coordinate math.
//!
//! Both blocks and voxels are addressed by signed 3D integer indices.
//! Conversion from world coordinates uses truncated floor division, so a
//! point exactly on a shared face belongs to the grid cell whose low face
//! it lies on, and negative positions map into the cell containing them.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::core::types::Point;

/// A signed 3D integer index addressing a block or voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridIndex {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl GridIndex {
    /// Create a new index.
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Origin index.
    #[inline]
    pub const fn zero() -> Self {
        Self { x: 0, y: 0, z: 0 }
    }

    /// Component-wise scale.
    #[inline]
    pub fn scaled(&self, s: i32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    /// World position of this index given the cell edge length.
    ///
    /// This is the cell's lattice corner, which is also where the TSDF is
    /// sampled.
    #[inline]
    pub fn position(&self, cell_size: f32) -> Point {
        Point::new(
            self.x as f32 * cell_size,
            self.y as f32 * cell_size,
            self.z as f32 * cell_size,
        )
    }

    /// Center of the cell this index addresses.
    #[inline]
    pub fn center(&self, cell_size: f32) -> Point {
        Point::new(
            (self.x as f32 + 0.5) * cell_size,
            (self.y as f32 + 0.5) * cell_size,
            (self.z as f32 + 0.5) * cell_size,
        )
    }
}

impl Add for GridIndex {
    type Output = GridIndex;

    #[inline]
    fn add(self, rhs: GridIndex) -> GridIndex {
        GridIndex::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for GridIndex {
    type Output = GridIndex;

    #[inline]
    fn sub(self, rhs: GridIndex) -> GridIndex {
        GridIndex::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl fmt::Display for GridIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl Hash for GridIndex {
    /// FNV-style mix of the three coordinates into one word.
    ///
    /// Block lookup is the hottest path in the layer; mixing the key
    /// ourselves keeps neighboring indices from clustering.
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        h = (h ^ self.x as u32 as u64).wrapping_mul(PRIME);
        h = (h ^ self.y as u32 as u64).wrapping_mul(PRIME);
        h = (h ^ self.z as u32 as u64).wrapping_mul(PRIME);
        state.write_u64(h);
    }
}

/// Floor division of a world coordinate by a cell size.
#[inline]
fn floor_div(value: f32, inv_cell_size: f32) -> i32 {
    (value * inv_cell_size).floor() as i32
}

/// Grid index of the cell containing a world point.
#[inline]
pub fn grid_index_from_point(point: &Point, inv_cell_size: f32) -> GridIndex {
    GridIndex::new(
        floor_div(point.x, inv_cell_size),
        floor_div(point.y, inv_cell_size),
        floor_div(point.z, inv_cell_size),
    )
}

/// Global voxel index of the voxel containing a world point.
#[inline]
pub fn global_voxel_index_from_point(point: &Point, inv_voxel_size: f32) -> GridIndex {
    grid_index_from_point(point, inv_voxel_size)
}

/// Block index owning a global voxel index.
#[inline]
pub fn block_index_from_global_voxel_index(global: &GridIndex, voxels_per_side: usize) -> GridIndex {
    let s = voxels_per_side as i32;
    GridIndex::new(
        global.x.div_euclid(s),
        global.y.div_euclid(s),
        global.z.div_euclid(s),
    )
}

/// Local voxel index of a global voxel index within its block.
#[inline]
pub fn local_voxel_index_from_global(global: &GridIndex, voxels_per_side: usize) -> GridIndex {
    let s = voxels_per_side as i32;
    GridIndex::new(
        global.x.rem_euclid(s),
        global.y.rem_euclid(s),
        global.z.rem_euclid(s),
    )
}

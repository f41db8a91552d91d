//! Per-cell neighbor addressing.
//!
//! A [`CAIndex`] bundles one cell's linear offset, its coordinate, and the
//! linear offsets of its neighborhood so that a rule touching several fields
//! of the same neighbors pays for the bounds checks once. Neighbors outside
//! the bounds are the [`OUT_OF_BOUNDS`] sentinel rather than an `Option`;
//! rules test validity by comparing against it.
//!
//! Naming: `l` is the negative direction along an axis, `r` the positive.
//! `xl` is the neighbor at `x-1`, `xr2` the neighbor at `x+2`, `xl_yr` the
//! face-diagonal neighbor at `x-1, y+1`.

use crate::bounds::{Bounds, VoxelIndex};

/// Sentinel for a neighbor whose coordinate lies outside the grid bounds.
///
/// Reserved out-of-range value; every valid linear offset is non-negative.
pub const OUT_OF_BOUNDS: isize = -1;

/// The location of a cell and its neighbors within the grid bounds.
///
/// Created fresh for each evaluation call and never mutated. The six axis
/// distance-1 neighbors are precomputed because nearly every rule reads
/// them; the distance-2 and face-diagonal neighbors are computed on demand
/// for the second-order stencils that need them.
#[derive(Clone, Copy, Debug)]
pub struct CAIndex {
    /// The linear offset of the cell being processed.
    pub index: usize,
    /// The coordinate of the cell being processed.
    pub voxel: VoxelIndex,
    /// The bounds of the simulation grid.
    pub bounds: Bounds,

    /// Linear offset of the neighbor at `x-1`, or [`OUT_OF_BOUNDS`].
    pub xl: isize,
    /// Linear offset of the neighbor at `x+1`, or [`OUT_OF_BOUNDS`].
    pub xr: isize,
    /// Linear offset of the neighbor at `y-1`, or [`OUT_OF_BOUNDS`].
    pub yl: isize,
    /// Linear offset of the neighbor at `y+1`, or [`OUT_OF_BOUNDS`].
    pub yr: isize,
    /// Linear offset of the neighbor at `z-1`, or [`OUT_OF_BOUNDS`].
    pub zl: isize,
    /// Linear offset of the neighbor at `z+1`, or [`OUT_OF_BOUNDS`].
    pub zr: isize,
}

impl CAIndex {
    /// Build the neighbor bundle for the cell at `linear_index`.
    ///
    /// The offset must be in `[0, bounds.size())`; the engine guarantees
    /// this for every scope it iterates.
    pub fn new(linear_index: usize, bounds: Bounds) -> Self {
        let voxel = bounds.delinearize_unchecked(linear_index);
        CAIndex {
            index: linear_index,
            voxel,
            bounds,
            xl: Self::offset_of(bounds, voxel, -1, 0, 0),
            xr: Self::offset_of(bounds, voxel, 1, 0, 0),
            yl: Self::offset_of(bounds, voxel, 0, -1, 0),
            yr: Self::offset_of(bounds, voxel, 0, 1, 0),
            zl: Self::offset_of(bounds, voxel, 0, 0, -1),
            zr: Self::offset_of(bounds, voxel, 0, 0, 1),
        }
    }

    #[inline]
    fn offset_of(bounds: Bounds, voxel: VoxelIndex, dx: i32, dy: i32, dz: i32) -> isize {
        let neighbor = voxel.adding(dx, dy, dz);
        if bounds.contains(neighbor) {
            bounds.linearize_unchecked(neighbor) as isize
        } else {
            OUT_OF_BOUNDS
        }
    }

    /// Neighbor at `x-2`, or [`OUT_OF_BOUNDS`].
    #[inline]
    pub fn xl2(&self) -> isize {
        Self::offset_of(self.bounds, self.voxel, -2, 0, 0)
    }

    /// Neighbor at `x+2`, or [`OUT_OF_BOUNDS`].
    #[inline]
    pub fn xr2(&self) -> isize {
        Self::offset_of(self.bounds, self.voxel, 2, 0, 0)
    }

    /// Neighbor at `y-2`, or [`OUT_OF_BOUNDS`].
    #[inline]
    pub fn yl2(&self) -> isize {
        Self::offset_of(self.bounds, self.voxel, 0, -2, 0)
    }

    /// Neighbor at `y+2`, or [`OUT_OF_BOUNDS`].
    #[inline]
    pub fn yr2(&self) -> isize {
        Self::offset_of(self.bounds, self.voxel, 0, 2, 0)
    }

    /// Neighbor at `z-2`, or [`OUT_OF_BOUNDS`].
    #[inline]
    pub fn zl2(&self) -> isize {
        Self::offset_of(self.bounds, self.voxel, 0, 0, -2)
    }

    /// Neighbor at `z+2`, or [`OUT_OF_BOUNDS`].
    #[inline]
    pub fn zr2(&self) -> isize {
        Self::offset_of(self.bounds, self.voxel, 0, 0, 2)
    }

    /// Face-diagonal neighbor at `x-1, y-1`, or [`OUT_OF_BOUNDS`].
    #[inline]
    pub fn xl_yl(&self) -> isize {
        Self::offset_of(self.bounds, self.voxel, -1, -1, 0)
    }

    /// Face-diagonal neighbor at `x+1, y-1`, or [`OUT_OF_BOUNDS`].
    #[inline]
    pub fn xr_yl(&self) -> isize {
        Self::offset_of(self.bounds, self.voxel, 1, -1, 0)
    }

    /// Face-diagonal neighbor at `x-1, y+1`, or [`OUT_OF_BOUNDS`].
    #[inline]
    pub fn xl_yr(&self) -> isize {
        Self::offset_of(self.bounds, self.voxel, -1, 1, 0)
    }

    /// Face-diagonal neighbor at `x+1, y+1`, or [`OUT_OF_BOUNDS`].
    #[inline]
    pub fn xr_yr(&self) -> isize {
        Self::offset_of(self.bounds, self.voxel, 1, 1, 0)
    }

    /// Face-diagonal neighbor at `x-1, z-1`, or [`OUT_OF_BOUNDS`].
    #[inline]
    pub fn xl_zl(&self) -> isize {
        Self::offset_of(self.bounds, self.voxel, -1, 0, -1)
    }

    /// Face-diagonal neighbor at `x+1, z-1`, or [`OUT_OF_BOUNDS`].
    #[inline]
    pub fn xr_zl(&self) -> isize {
        Self::offset_of(self.bounds, self.voxel, 1, 0, -1)
    }

    /// Face-diagonal neighbor at `x-1, z+1`, or [`OUT_OF_BOUNDS`].
    #[inline]
    pub fn xl_zr(&self) -> isize {
        Self::offset_of(self.bounds, self.voxel, -1, 0, 1)
    }

    /// Face-diagonal neighbor at `x+1, z+1`, or [`OUT_OF_BOUNDS`].
    #[inline]
    pub fn xr_zr(&self) -> isize {
        Self::offset_of(self.bounds, self.voxel, 1, 0, 1)
    }

    /// Face-diagonal neighbor at `y-1, z-1`, or [`OUT_OF_BOUNDS`].
    #[inline]
    pub fn yl_zl(&self) -> isize {
        Self::offset_of(self.bounds, self.voxel, 0, -1, -1)
    }

    /// Face-diagonal neighbor at `y+1, z-1`, or [`OUT_OF_BOUNDS`].
    #[inline]
    pub fn yr_zl(&self) -> isize {
        Self::offset_of(self.bounds, self.voxel, 0, 1, -1)
    }

    /// Face-diagonal neighbor at `y-1, z+1`, or [`OUT_OF_BOUNDS`].
    #[inline]
    pub fn yl_zr(&self) -> isize {
        Self::offset_of(self.bounds, self.voxel, 0, -1, 1)
    }

    /// Face-diagonal neighbor at `y+1, z+1`, or [`OUT_OF_BOUNDS`].
    #[inline]
    pub fn yr_zr(&self) -> isize {
        Self::offset_of(self.bounds, self.voxel, 0, 1, 1)
    }

    /// Iterate the linear offsets of the axis distance-1 neighbors that are
    /// inside the grid, for rules that walk an unknown number of neighbors
    /// (averaging, flood fill, and similar).
    pub fn neighbors_in_bounds(&self) -> impl Iterator<Item = usize> {
        [self.xl, self.xr, self.yl, self.yr, self.zl, self.zr]
            .into_iter()
            .filter(|&n| n != OUT_OF_BOUNDS)
            .map(|n| n as usize)
    }
}

//! Grid bounds and linear index arithmetic.
//!
//! The grid is an inclusive axis-aligned box of integer coordinates. Every
//! coordinate inside the box maps to exactly one linear offset in
//! `[0, size)` and back. The layout is row-major with `x` varying fastest,
//! then `y`, then `z`:
//!
//! ```text
//! offset = (z - min.z) * height * width + (y - min.y) * width + (x - min.x)
//! ```
//!
//! Neighbor arithmetic elsewhere in the crate relies on this exact ordering,
//! so it is part of the public contract and must not change.

use thiserror::Error;

/// Errors from checked coordinate and offset conversions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoundsError {
    /// A coordinate lies outside the bounds on at least one axis.
    #[error("voxel index ({0}, {1}, {2}) is outside the bounds")]
    IndexOutOfBounds(i32, i32, i32),
    /// A linear offset is not in `[0, size)`.
    #[error("linear offset {offset} is outside the bounds (size {size})")]
    OffsetOutOfBounds { offset: usize, size: usize },
    /// The minimum corner exceeds the maximum corner on at least one axis.
    #[error("invalid bounds: min must not exceed max on any axis")]
    InvertedBounds,
}

/// An integer 3D coordinate within a voxel grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoxelIndex {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelIndex {
    /// Create a new coordinate.
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        VoxelIndex { x, y, z }
    }

    /// Componentwise sum, used for neighbor offsets.
    #[inline]
    pub const fn adding(self, dx: i32, dy: i32, dz: i32) -> Self {
        VoxelIndex::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

impl From<(i32, i32, i32)> for VoxelIndex {
    #[inline]
    fn from((x, y, z): (i32, i32, i32)) -> Self {
        VoxelIndex::new(x, y, z)
    }
}

/// An inclusive axis-aligned box of voxel coordinates.
///
/// Immutable once constructed. Copied (never shared) into every storage
/// instance and engine that needs it, so no cross-mutation is possible.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    min: VoxelIndex,
    max: VoxelIndex,
}

impl Bounds {
    /// Create bounds from inclusive corners.
    ///
    /// Fails with [`BoundsError::InvertedBounds`] unless `min <= max` on
    /// every axis.
    pub fn new(min: VoxelIndex, max: VoxelIndex) -> Result<Self, BoundsError> {
        if min.x > max.x || min.y > max.y || min.z > max.z {
            return Err(BoundsError::InvertedBounds);
        }
        Ok(Bounds { min, max })
    }

    /// Bounds from `(0, 0, 0)` to the given inclusive corner.
    pub fn from_origin(max: VoxelIndex) -> Result<Self, BoundsError> {
        Bounds::new(VoxelIndex::new(0, 0, 0), max)
    }

    /// The minimum corner.
    #[inline]
    pub fn min(&self) -> VoxelIndex {
        self.min
    }

    /// The maximum corner.
    #[inline]
    pub fn max(&self) -> VoxelIndex {
        self.max
    }

    /// Extent along the x axis, in cells.
    #[inline]
    pub fn width(&self) -> usize {
        (self.max.x - self.min.x) as usize + 1
    }

    /// Extent along the y axis, in cells.
    #[inline]
    pub fn height(&self) -> usize {
        (self.max.y - self.min.y) as usize + 1
    }

    /// Extent along the z axis, in cells.
    #[inline]
    pub fn depth(&self) -> usize {
        (self.max.z - self.min.z) as usize + 1
    }

    /// Total number of cells in the box.
    #[inline]
    pub fn size(&self) -> usize {
        self.width() * self.height() * self.depth()
    }

    /// Whether a coordinate is inside the box on every axis.
    #[inline]
    pub fn contains(&self, v: VoxelIndex) -> bool {
        v.x >= self.min.x
            && v.x <= self.max.x
            && v.y >= self.min.y
            && v.y <= self.max.y
            && v.z >= self.min.z
            && v.z <= self.max.z
    }

    /// Whether another box lies entirely inside this one.
    #[inline]
    pub fn contains_bounds(&self, other: &Bounds) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    /// Map a coordinate to its linear offset, failing if it is outside the
    /// bounds.
    #[inline]
    pub fn linearize(&self, v: VoxelIndex) -> Result<usize, BoundsError> {
        if !self.contains(v) {
            return Err(BoundsError::IndexOutOfBounds(v.x, v.y, v.z));
        }
        Ok(self.linearize_unchecked(v))
    }

    /// Map a coordinate to its linear offset without a containment check.
    ///
    /// The caller must already have established `contains(v)`; callers on
    /// hot paths use this after [`CAIndex`](crate::index::CAIndex)
    /// precomputation has done the check once.
    #[inline]
    pub fn linearize_unchecked(&self, v: VoxelIndex) -> usize {
        debug_assert!(self.contains(v), "linearize_unchecked outside bounds");
        let w = self.width();
        let h = self.height();
        (v.z - self.min.z) as usize * h * w
            + (v.y - self.min.y) as usize * w
            + (v.x - self.min.x) as usize
    }

    /// Map a linear offset back to its coordinate, failing if it is not in
    /// `[0, size)`.
    #[inline]
    pub fn delinearize(&self, offset: usize) -> Result<VoxelIndex, BoundsError> {
        if offset >= self.size() {
            return Err(BoundsError::OffsetOutOfBounds {
                offset,
                size: self.size(),
            });
        }
        Ok(self.delinearize_unchecked(offset))
    }

    /// Map a linear offset back to its coordinate without a range check.
    #[inline]
    pub fn delinearize_unchecked(&self, offset: usize) -> VoxelIndex {
        debug_assert!(offset < self.size(), "delinearize_unchecked outside bounds");
        let w = self.width();
        let h = self.height();
        let z = offset / (h * w);
        let rem = offset % (h * w);
        let y = rem / w;
        let x = rem % w;
        VoxelIndex::new(
            self.min.x + x as i32,
            self.min.y + y as i32,
            self.min.z + z as i32,
        )
    }

    /// Iterate every coordinate in the box in linear-offset order.
    pub fn indices(&self) -> BoundsIter {
        BoundsIter {
            bounds: *self,
            next: 0,
            size: self.size(),
        }
    }
}

/// Iterator over the coordinates of a [`Bounds`] in linear-offset order.
pub struct BoundsIter {
    bounds: Bounds,
    next: usize,
    size: usize,
}

impl Iterator for BoundsIter {
    type Item = VoxelIndex;

    fn next(&mut self) -> Option<VoxelIndex> {
        if self.next >= self.size {
            return None;
        }
        let v = self.bounds.delinearize_unchecked(self.next);
        self.next += 1;
        Some(v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.size - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BoundsIter {}

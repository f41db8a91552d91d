//! Storage abstraction for per-cell simulation data.
//!
//! The engine never assumes a data layout. Anything that can be built from a
//! dense snapshot, hand back a cell value by linear offset, and accept one
//! back can serve as simulation storage: a single array of composite records,
//! several parallel field arrays, or something sparser. [`GridStorage`] is
//! the array-of-structs reference implementation; tests also exercise a
//! parallel-arrays layout to keep the engine honest about the contract.

use crate::bounds::{Bounds, BoundsError, VoxelIndex};

/// A dense snapshot of the grid: one value per cell, in linear-offset order.
///
/// This is the interchange type between callers and the engine. Seeds are
/// provided as a `DenseGrid`, and [`crate::engine::Engine::current`]
/// reconstitutes one.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseGrid<T> {
    bounds: Bounds,
    cells: Vec<T>,
}

impl<T: Clone> DenseGrid<T> {
    /// Create a grid with every cell set to `initial`.
    pub fn new(bounds: Bounds, initial: T) -> Self {
        DenseGrid {
            bounds,
            cells: vec![initial; bounds.size()],
        }
    }

    /// The grid bounds.
    #[inline]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the grid holds no cells at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Read a cell by coordinate.
    pub fn get(&self, v: VoxelIndex) -> Result<&T, BoundsError> {
        let offset = self.bounds.linearize(v)?;
        Ok(&self.cells[offset])
    }

    /// Write a cell by coordinate.
    pub fn set(&mut self, v: VoxelIndex, value: T) -> Result<(), BoundsError> {
        let offset = self.bounds.linearize(v)?;
        self.cells[offset] = value;
        Ok(())
    }

    /// Read a cell by linear offset. Offsets come from
    /// [`Bounds::linearize`], so the index is known valid.
    #[inline]
    pub fn value_at(&self, offset: usize) -> &T {
        &self.cells[offset]
    }

    /// Write a cell by linear offset.
    #[inline]
    pub fn set_at(&mut self, offset: usize, value: T) {
        self.cells[offset] = value;
    }

    /// Set every cell inside `region` to `value`. Used to seed slabs and
    /// blocks of interest before handing the grid to an engine.
    pub fn fill_region(&mut self, region: Bounds, value: T) -> Result<(), BoundsError> {
        if !self.bounds.contains_bounds(&region) {
            return Err(BoundsError::IndexOutOfBounds(
                region.max().x,
                region.max().y,
                region.max().z,
            ));
        }
        for v in region.indices() {
            let offset = self.bounds.linearize_unchecked(v);
            self.cells[offset] = value.clone();
        }
        Ok(())
    }

    /// Iterate cell values in linear-offset order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.cells.iter()
    }
}

/// The capability contract any concrete storage layout implements.
///
/// Two instances of the same storage type seeded from the same snapshot
/// back the engine's ping-pong buffers. The engine reads through
/// [`voxel_at`](SimStorage::voxel_at), applies cell-rule results through
/// [`store_voxel`](SimStorage::store_voxel), and reconstitutes snapshots
/// through [`current`](SimStorage::current); it never learns whether the
/// implementation keeps one array of composites or many parallel arrays.
///
/// `Send + Sync` bounds let the engine fan cell evaluation out across a
/// rayon pool; a storage holding only owned field vectors satisfies them
/// automatically.
pub trait SimStorage: Send + Sync + Sized {
    /// The composite per-cell value used for import and export.
    type Voxel: Clone + Send + Sync;

    /// Build a storage instance from a dense snapshot.
    fn from_seed(seed: &DenseGrid<Self::Voxel>) -> Self;

    /// The bounds this storage was seeded with.
    fn bounds(&self) -> Bounds;

    /// The default cell value used when reconstituting a snapshot from a
    /// possibly sparse internal representation.
    fn default_voxel(&self) -> Self::Voxel;

    /// Reassemble the cell value at a linear offset.
    fn voxel_at(&self, offset: usize) -> Self::Voxel;

    /// Decompose a cell value back into the internal representation at a
    /// linear offset.
    fn store_voxel(&mut self, offset: usize, voxel: Self::Voxel);

    /// Reassemble the whole state into a dense snapshot.
    ///
    /// The provided implementation walks every offset through
    /// [`voxel_at`](SimStorage::voxel_at); implementations with a cheaper
    /// path may override it.
    fn current(&self) -> DenseGrid<Self::Voxel> {
        let bounds = self.bounds();
        let mut grid = DenseGrid::new(bounds, self.default_voxel());
        for offset in 0..bounds.size() {
            grid.set_at(offset, self.voxel_at(offset));
        }
        grid
    }
}

/// Array-of-structs storage: one `Vec` of composite values.
///
/// The simplest layout that satisfies [`SimStorage`]; suitable whenever the
/// rules read whole cell values rather than sweeping a single field.
#[derive(Clone, Debug)]
pub struct GridStorage<T> {
    bounds: Bounds,
    default: T,
    cells: Vec<T>,
}

impl<T: Clone + Send + Sync + Default> SimStorage for GridStorage<T> {
    type Voxel = T;

    fn from_seed(seed: &DenseGrid<T>) -> Self {
        GridStorage {
            bounds: seed.bounds(),
            default: T::default(),
            cells: seed.iter().cloned().collect(),
        }
    }

    #[inline]
    fn bounds(&self) -> Bounds {
        self.bounds
    }

    #[inline]
    fn default_voxel(&self) -> T {
        self.default.clone()
    }

    #[inline]
    fn voxel_at(&self, offset: usize) -> T {
        self.cells[offset].clone()
    }

    #[inline]
    fn store_voxel(&mut self, offset: usize, voxel: T) {
        self.cells[offset] = voxel;
    }
}

impl<T> GridStorage<T> {
    /// Mutable access to the backing cells, for swap steps that exchange
    /// the whole field between two instances.
    pub fn cells_mut(&mut self) -> &mut Vec<T> {
        &mut self.cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::{Bounds, VoxelIndex};

    fn bounds_4() -> Bounds {
        Bounds::from_origin(VoxelIndex::new(3, 3, 3)).unwrap()
    }

    #[test]
    fn test_dense_grid_get_set() {
        let mut grid = DenseGrid::new(bounds_4(), 0u32);
        assert_eq!(grid.len(), 64);

        grid.set(VoxelIndex::new(1, 2, 3), 17).unwrap();
        assert_eq!(*grid.get(VoxelIndex::new(1, 2, 3)).unwrap(), 17);
        assert_eq!(*grid.get(VoxelIndex::new(0, 0, 0)).unwrap(), 0);

        assert!(grid.get(VoxelIndex::new(4, 0, 0)).is_err());
        assert!(grid.set(VoxelIndex::new(0, 0, -1), 3).is_err());
    }

    #[test]
    fn test_fill_region() {
        let mut grid = DenseGrid::new(bounds_4(), 0u32);
        let slab = Bounds::new(VoxelIndex::new(0, 0, 0), VoxelIndex::new(3, 0, 3)).unwrap();
        grid.fill_region(slab, 9).unwrap();

        let filled = grid.iter().filter(|&&v| v == 9).count();
        assert_eq!(filled, 16);
        assert_eq!(*grid.get(VoxelIndex::new(2, 0, 2)).unwrap(), 9);
        assert_eq!(*grid.get(VoxelIndex::new(2, 1, 2)).unwrap(), 0);

        let too_big = Bounds::from_origin(VoxelIndex::new(4, 4, 4)).unwrap();
        assert!(grid.fill_region(too_big, 1).is_err());
    }

    #[test]
    fn test_grid_storage_round_trip() {
        let mut seed = DenseGrid::new(bounds_4(), 0i64);
        seed.set(VoxelIndex::new(3, 1, 0), 42).unwrap();

        let storage = GridStorage::from_seed(&seed);
        assert_eq!(storage.bounds(), seed.bounds());

        let offset = seed.bounds().linearize(VoxelIndex::new(3, 1, 0)).unwrap();
        assert_eq!(storage.voxel_at(offset), 42);
        assert_eq!(storage.current(), seed);
    }

    #[test]
    fn test_grid_storage_store_voxel() {
        let seed = DenseGrid::new(bounds_4(), 0i64);
        let mut storage = GridStorage::from_seed(&seed);
        storage.store_voxel(5, -3);
        assert_eq!(storage.voxel_at(5), -3);
        assert_eq!(storage.voxel_at(6), 0);
    }
}

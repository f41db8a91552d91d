//! Voxel Sim - 3D Cellular Automata Simulation Engine
//!
//! A generic engine for running cellular-automaton rules over a 3D voxel
//! grid. The grid is an inclusive integer box with a fixed linear layout
//! (`x` fastest, then `y`, then `z`); per-cell data lives behind the
//! [`SimStorage`] trait so rules can run against an array of composite
//! records or parallel field arrays without changing. The [`Engine`] keeps
//! two storage buffers, applies an ordered list of [`Rule`]s each tick,
//! and exchanges the buffers exactly once per tick, so every rule reads a
//! consistent committed generation.
//!
//! ```
//! use std::time::Duration;
//! use voxel_sim::{
//!     Bounds, CAIndex, CellResult, DenseGrid, Engine, GridStorage, Rule, RuleScope, SimStorage,
//!     VoxelIndex,
//! };
//!
//! let bounds = Bounds::from_origin(VoxelIndex::new(9, 9, 9)).unwrap();
//! let seed = DenseGrid::new(bounds, 0u32);
//! let increment = Rule::cell(
//!     "increment",
//!     RuleScope::All,
//!     |cell: &CAIndex, _dt: Duration, current: &GridStorage<u32>| {
//!         CellResult::updated(current.voxel_at(cell.index) + 1)
//!     },
//! );
//!
//! let mut engine = Engine::new(&seed, vec![increment]).unwrap();
//! engine.tick(Duration::from_millis(16)).unwrap();
//! assert_eq!(*engine.current().get(VoxelIndex::new(4, 4, 4)).unwrap(), 1);
//! ```

pub mod bounds;
pub mod diagnostic;
pub mod engine;
pub mod index;
pub mod rule;
pub mod storage;

pub use bounds::{Bounds, BoundsError, BoundsIter, VoxelIndex};
pub use diagnostic::{DetailedDiagnostic, Diagnostic};
pub use engine::{Engine, EngineError};
pub use index::{CAIndex, OUT_OF_BOUNDS};
pub use rule::{CellResult, CellStep, EvaluateStep, Rule, RuleResult, RuleScope, SwapStep};
pub use storage::{DenseGrid, GridStorage, SimStorage};

#[cfg(test)]
mod tests;

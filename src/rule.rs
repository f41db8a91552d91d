//! Pluggable simulation rules.
//!
//! A rule is either a *swap* (exchange fields between the two storage
//! buffers, no per-cell logic), an *evaluate* (read the current buffer,
//! write into the next one, sequential, may write into listed neighbor
//! cells), or a *cell* step (return a replacement value for its own cell
//! only, which is what lets the engine fan it out across worker threads).
//!
//! Evaluate and cell steps must not read the next buffer and must not
//! assume any ordering among cells within one rule application. Cross-cell
//! writes from an evaluate step have to be commutative with respect to
//! visit order for the same reason.

use std::time::Duration;

use crate::bounds::{Bounds, VoxelIndex};
use crate::index::CAIndex;
use crate::storage::SimStorage;

/// The set of cells a rule is applied to on each tick.
///
/// Only `All` and `Active` contribute to the next tick's active set;
/// `Bounds`, `Index`, and `Collection` mutate storage and emit diagnostics
/// without waking the rest of the grid.
#[derive(Clone, Debug)]
pub enum RuleScope {
    /// Every cell in the grid.
    All,
    /// Exactly the cells flagged updated on the previous tick.
    Active,
    /// Every cell inside a sub-box, which must be contained in the grid.
    Bounds(Bounds),
    /// A single cell.
    Index(VoxelIndex),
    /// An explicit list of cells.
    Collection(Vec<VoxelIndex>),
}

/// Outcome of an evaluate step for one cell.
#[derive(Clone, Debug, Default)]
pub struct RuleResult {
    /// Whether the cell counts as updated for active-set bookkeeping.
    pub updated: bool,
    /// Diagnostic messages, delivered only when non-empty.
    pub messages: Vec<String>,
}

impl RuleResult {
    /// The cell was updated.
    pub fn updated() -> Self {
        RuleResult {
            updated: true,
            messages: Vec::new(),
        }
    }

    /// The cell was left alone.
    pub fn unchanged() -> Self {
        RuleResult {
            updated: false,
            messages: Vec::new(),
        }
    }

    /// Attach diagnostic messages to this result.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    /// A per-cell failure: the cell is not updated and the error text is
    /// carried in the diagnostic payload so the tick can continue.
    pub fn failed(error: impl std::fmt::Display) -> Self {
        RuleResult {
            updated: false,
            messages: vec![error.to_string()],
        }
    }
}

/// Outcome of a cell step for one cell.
#[derive(Clone, Debug)]
pub struct CellResult<T> {
    /// Replacement value for this cell, or `None` to leave the next buffer
    /// untouched at this offset.
    pub voxel: Option<T>,
    /// Diagnostic messages, delivered only when non-empty.
    pub messages: Vec<String>,
}

impl<T> CellResult<T> {
    /// The cell takes a new value.
    pub fn updated(voxel: T) -> Self {
        CellResult {
            voxel: Some(voxel),
            messages: Vec::new(),
        }
    }

    /// The cell keeps whatever the next buffer already holds.
    pub fn unchanged() -> Self {
        CellResult {
            voxel: None,
            messages: Vec::new(),
        }
    }

    /// Attach diagnostic messages to this result.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    /// A per-cell failure carried as a diagnostic, not an abort.
    pub fn failed(error: impl std::fmt::Display) -> Self {
        CellResult {
            voxel: None,
            messages: vec![error.to_string()],
        }
    }
}

/// Exchanges designated fields between the two storage buffers in place.
///
/// Runs unconditionally, once per tick, at its position in the rule list.
pub trait SwapStep<S: SimStorage>: Send + Sync {
    fn perform(&self, storage0: &mut S, storage1: &mut S);
}

impl<S, F> SwapStep<S> for F
where
    S: SimStorage,
    F: Fn(&mut S, &mut S) + Send + Sync,
{
    fn perform(&self, storage0: &mut S, storage1: &mut S) {
        self(storage0, storage1)
    }
}

/// Reads the current buffer and writes into the next one.
///
/// The step writes the fields it is responsible for at its own cell and,
/// exceptionally, at listed neighbor cells (outgoing-flow bookkeeping and
/// the like). A step that writes nothing leaves the previous generation's
/// value in the next buffer at that offset.
pub trait EvaluateStep<S: SimStorage>: Send + Sync {
    fn evaluate(
        &self,
        cell: &CAIndex,
        delta_time: Duration,
        current: &S,
        next: &mut S,
    ) -> RuleResult;
}

impl<S, F> EvaluateStep<S> for F
where
    S: SimStorage,
    F: Fn(&CAIndex, Duration, &S, &mut S) -> RuleResult + Send + Sync,
{
    fn evaluate(
        &self,
        cell: &CAIndex,
        delta_time: Duration,
        current: &S,
        next: &mut S,
    ) -> RuleResult {
        self(cell, delta_time, current, next)
    }
}

/// Computes a replacement value for its own cell from the current buffer.
///
/// Because a cell step touches nothing but its own slot, the engine is free
/// to evaluate a scope's cells concurrently and apply the results afterward.
pub trait CellStep<S: SimStorage>: Send + Sync {
    fn evaluate(&self, cell: &CAIndex, delta_time: Duration, current: &S)
        -> CellResult<S::Voxel>;
}

impl<S, F> CellStep<S> for F
where
    S: SimStorage,
    F: Fn(&CAIndex, Duration, &S) -> CellResult<S::Voxel> + Send + Sync,
{
    fn evaluate(
        &self,
        cell: &CAIndex,
        delta_time: Duration,
        current: &S,
    ) -> CellResult<S::Voxel> {
        self(cell, delta_time, current)
    }
}

/// A named rule in the engine's ordered list.
pub enum Rule<S: SimStorage> {
    /// Field exchange between the buffers; has no scope.
    Swap {
        name: String,
        step: Box<dyn SwapStep<S>>,
    },
    /// Sequential per-cell evaluation with full next-buffer access.
    Evaluate {
        name: String,
        scope: RuleScope,
        step: Box<dyn EvaluateStep<S>>,
    },
    /// Own-cell replacement evaluation, eligible for parallel fan-out.
    Cell {
        name: String,
        scope: RuleScope,
        step: Box<dyn CellStep<S>>,
    },
}

impl<S: SimStorage> Rule<S> {
    /// A swap rule.
    pub fn swap(name: impl Into<String>, step: impl SwapStep<S> + 'static) -> Self {
        Rule::Swap {
            name: name.into(),
            step: Box::new(step),
        }
    }

    /// An evaluate rule over the given scope.
    pub fn evaluate(
        name: impl Into<String>,
        scope: RuleScope,
        step: impl EvaluateStep<S> + 'static,
    ) -> Self {
        Rule::Evaluate {
            name: name.into(),
            scope,
            step: Box::new(step),
        }
    }

    /// A cell rule over the given scope.
    pub fn cell(
        name: impl Into<String>,
        scope: RuleScope,
        step: impl CellStep<S> + 'static,
    ) -> Self {
        Rule::Cell {
            name: name.into(),
            scope,
            step: Box::new(step),
        }
    }

    /// The rule's name, as it appears in diagnostics.
    pub fn name(&self) -> &str {
        match self {
            Rule::Swap { name, .. } | Rule::Evaluate { name, .. } | Rule::Cell { name, .. } => name,
        }
    }

    /// The rule's scope; swap rules have none.
    pub fn scope(&self) -> Option<&RuleScope> {
        match self {
            Rule::Swap { .. } => None,
            Rule::Evaluate { scope, .. } | Rule::Cell { scope, .. } => Some(scope),
        }
    }
}

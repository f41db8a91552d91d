//! The double-buffered simulation engine.
//!
//! The engine owns two storage instances seeded from the same snapshot.
//! During a tick every rule reads from the current buffer and writes into
//! the next one; the buffers are exchanged exactly once, when the last rule
//! finishes. A tick can also be advanced in bounded slices of wall-clock
//! time, suspending between rules, so a caller with a frame budget never
//! observes a half-applied rule.

use std::collections::HashSet;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, trace};

use crate::bounds::{Bounds, VoxelIndex};
use crate::diagnostic::{DetailedDiagnostic, Diagnostic, DiagnosticSink};
use crate::index::CAIndex;
use crate::rule::{Rule, RuleScope};
use crate::storage::{DenseGrid, SimStorage};

/// Errors from engine construction and tick control.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The seed snapshot holds no cells.
    #[error("seed grid holds no cells")]
    EmptySeed,
    /// A rule's scope addresses cells outside the grid.
    #[error("rule `{rule}` addresses cells outside the grid bounds")]
    ScopeOutOfBounds { rule: String },
    /// A suspended tick has not been driven to completion.
    #[error("a tick is already in flight; resume it with advance")]
    TickInProgress,
    /// The worker pool could not be built.
    #[error("failed to build worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Position of a suspended tick: the next rule to run.
struct TickCursor {
    rule_index: usize,
    delta_time: Duration,
}

/// A generic 3D cellular-automaton engine over pluggable storage and an
/// ordered list of rules.
pub struct Engine<S: SimStorage> {
    bounds: Bounds,
    /// The buffer rules read from; holds the latest committed generation.
    storage0: S,
    /// The buffer rules write into.
    storage1: S,
    rules: Vec<Rule<S>>,
    /// Cells flagged updated by the most recent all/active rule evaluation.
    /// Each all/active rule replaces this set; other rules never touch it.
    actives: HashSet<usize>,
    /// Cells flagged updated since [`Engine::changes`] was last drained.
    changed: HashSet<usize>,
    generation: u64,
    cursor: Option<TickCursor>,
    sink: DiagnosticSink,
    pool: Option<rayon::ThreadPool>,
}

impl<S: SimStorage> Engine<S> {
    /// Build an engine from a seed snapshot and an ordered rule list.
    ///
    /// Both internal buffers are seeded from the snapshot, and every cell
    /// starts active. Fails if the seed is empty or any rule scope reaches
    /// outside the seed's bounds.
    pub fn new(seed: &DenseGrid<S::Voxel>, rules: Vec<Rule<S>>) -> Result<Self, EngineError> {
        if seed.is_empty() {
            return Err(EngineError::EmptySeed);
        }
        let bounds = seed.bounds();
        for rule in &rules {
            if !scope_in_bounds(&bounds, rule.scope()) {
                return Err(EngineError::ScopeOutOfBounds {
                    rule: rule.name().to_string(),
                });
            }
        }
        Ok(Engine {
            bounds,
            storage0: S::from_seed(seed),
            storage1: S::from_seed(seed),
            rules,
            actives: (0..bounds.size()).collect(),
            changed: HashSet::new(),
            generation: 0,
            cursor: None,
            sink: DiagnosticSink::default(),
            pool: None,
        })
    }

    /// Like [`Engine::new`], but cell rules fan out over a dedicated pool
    /// of `num_threads` workers instead of running inline.
    pub fn with_threads(
        seed: &DenseGrid<S::Voxel>,
        rules: Vec<Rule<S>>,
        num_threads: usize,
    ) -> Result<Self, EngineError> {
        let mut engine = Engine::new(seed, rules)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .build()?;
        engine.pool = Some(pool);
        Ok(engine)
    }

    /// The grid bounds.
    #[inline]
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Number of completed ticks since construction.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of cells currently in the active set.
    #[inline]
    pub fn active_count(&self) -> usize {
        self.actives.len()
    }

    /// Whether a suspended tick is waiting to be resumed.
    #[inline]
    pub fn is_ticking(&self) -> bool {
        self.cursor.is_some()
    }

    /// A dense snapshot of the latest committed generation.
    pub fn current(&self) -> DenseGrid<S::Voxel> {
        self.storage0.current()
    }

    /// Drain the cells updated since the last call, with their committed
    /// values, in linear-offset order.
    pub fn changes(&mut self) -> Vec<(VoxelIndex, S::Voxel)> {
        let mut offsets: Vec<usize> = self.changed.drain().collect();
        offsets.sort_unstable();
        offsets
            .into_iter()
            .map(|o| (self.bounds.delinearize_unchecked(o), self.storage0.voxel_at(o)))
            .collect()
    }

    /// Subscribe to per-cell diagnostic messages. Each subscriber gets its
    /// own bounded channel; dropping the receiver unsubscribes it.
    pub fn diagnostic_stream(&mut self) -> Receiver<Diagnostic> {
        self.sink.subscribe()
    }

    /// Run one full tick: every rule in order, one buffer exchange at the
    /// end.
    pub fn tick(&mut self, delta_time: Duration) -> Result<(), EngineError> {
        self.begin_tick(delta_time)?;
        let finished = self.advance(Duration::MAX);
        debug_assert!(finished);
        Ok(())
    }

    /// Start a tick without running any rules yet. Drive it with
    /// [`Engine::advance`].
    pub fn begin_tick(&mut self, delta_time: Duration) -> Result<(), EngineError> {
        if self.cursor.is_some() {
            return Err(EngineError::TickInProgress);
        }
        self.cursor = Some(TickCursor {
            rule_index: 0,
            delta_time,
        });
        Ok(())
    }

    /// Run rules from the in-flight tick until it completes or the budget
    /// is spent. Rules are whole units of work: the budget is checked only
    /// between them, never inside one. Returns `true` once the tick has
    /// been committed.
    ///
    /// Calling this with no tick in flight is a no-op that returns `true`.
    pub fn advance(&mut self, budget: Duration) -> bool {
        let mut cursor = match self.cursor.take() {
            Some(c) => c,
            None => return true,
        };
        let deadline = Instant::now().checked_add(budget);

        let Engine {
            bounds,
            storage0,
            storage1,
            rules,
            actives,
            changed,
            sink,
            pool,
            ..
        } = self;

        while cursor.rule_index < rules.len() {
            let rule = &rules[cursor.rule_index];
            run_rule(
                rule,
                cursor.delta_time,
                bounds,
                storage0,
                storage1,
                actives,
                changed,
                sink,
                pool.as_ref(),
            );
            cursor.rule_index += 1;

            let out_of_budget = deadline.is_some_and(|d| Instant::now() >= d);
            if out_of_budget && cursor.rule_index < rules.len() {
                break;
            }
        }

        if cursor.rule_index < rules.len() {
            self.cursor = Some(cursor);
            return false;
        }

        std::mem::swap(&mut self.storage0, &mut self.storage1);
        self.generation += 1;
        debug!(
            generation = self.generation,
            actives = self.actives.len(),
            "tick committed"
        );
        true
    }

    /// Run a single rule as a committed one-rule tick and return an
    /// evaluation trace for every cell in its scope.
    ///
    /// Active-set and change bookkeeping behave exactly as in a normal
    /// tick, and the buffers are exchanged afterward. Swap rules run but
    /// yield no per-cell trace.
    pub fn diagnostic_evaluate(
        &mut self,
        delta_time: Duration,
        rule: &Rule<S>,
    ) -> Result<Vec<DetailedDiagnostic<S::Voxel>>, EngineError> {
        if self.cursor.is_some() {
            return Err(EngineError::TickInProgress);
        }
        if !scope_in_bounds(&self.bounds, rule.scope()) {
            return Err(EngineError::ScopeOutOfBounds {
                rule: rule.name().to_string(),
            });
        }

        let mut details = Vec::new();
        let mut updated = HashSet::new();
        let counts_active = matches!(rule.scope(), Some(RuleScope::All | RuleScope::Active));

        match rule {
            Rule::Swap { step, .. } => {
                step.perform(&mut self.storage0, &mut self.storage1);
            }
            Rule::Evaluate { name, scope, step } => {
                for offset in scope_offsets(&self.bounds, &self.actives, scope) {
                    let cell = CAIndex::new(offset, self.bounds);
                    let initial = self.storage0.voxel_at(offset);
                    let result =
                        step.evaluate(&cell, delta_time, &self.storage0, &mut self.storage1);
                    if result.updated {
                        self.changed.insert(offset);
                        updated.insert(offset);
                    }
                    details.push(DetailedDiagnostic {
                        index: cell.voxel,
                        rule: name.clone(),
                        initial_value: initial,
                        final_value: result.updated.then(|| self.storage1.voxel_at(offset)),
                        messages: result.messages,
                    });
                }
            }
            Rule::Cell { name, scope, step } => {
                for offset in scope_offsets(&self.bounds, &self.actives, scope) {
                    let cell = CAIndex::new(offset, self.bounds);
                    let initial = self.storage0.voxel_at(offset);
                    let result = step.evaluate(&cell, delta_time, &self.storage0);
                    if let Some(voxel) = result.voxel.clone() {
                        self.storage1.store_voxel(offset, voxel);
                        self.changed.insert(offset);
                        updated.insert(offset);
                    }
                    details.push(DetailedDiagnostic {
                        index: cell.voxel,
                        rule: name.clone(),
                        initial_value: initial,
                        final_value: result.voxel,
                        messages: result.messages,
                    });
                }
            }
        }

        std::mem::swap(&mut self.storage0, &mut self.storage1);
        if counts_active {
            self.actives = updated;
        }
        self.generation += 1;
        Ok(details)
    }
}

/// Whether a scope stays inside the grid. Swap rules (no scope) always do.
fn scope_in_bounds(bounds: &Bounds, scope: Option<&RuleScope>) -> bool {
    match scope {
        None | Some(RuleScope::All) | Some(RuleScope::Active) => true,
        Some(RuleScope::Bounds(b)) => bounds.contains_bounds(b),
        Some(RuleScope::Index(v)) => bounds.contains(*v),
        Some(RuleScope::Collection(vs)) => vs.iter().all(|v| bounds.contains(*v)),
    }
}

/// Materialize a scope into linear offsets, in a deterministic order.
fn scope_offsets(bounds: &Bounds, actives: &HashSet<usize>, scope: &RuleScope) -> Vec<usize> {
    match scope {
        RuleScope::All => (0..bounds.size()).collect(),
        RuleScope::Active => {
            let mut offsets: Vec<usize> = actives.iter().copied().collect();
            offsets.sort_unstable();
            offsets
        }
        RuleScope::Bounds(b) => b
            .indices()
            .map(|v| bounds.linearize_unchecked(v))
            .collect(),
        RuleScope::Index(v) => vec![bounds.linearize_unchecked(*v)],
        RuleScope::Collection(vs) => vs
            .iter()
            .map(|v| bounds.linearize_unchecked(*v))
            .collect(),
    }
}

/// Apply one rule against the buffer pair and record its bookkeeping.
///
/// An all/active rule replaces the active set with the cells it flagged
/// updated, as soon as it completes; a later active-scope rule in the same
/// tick therefore iterates the set this one just produced. Swap rules and
/// bounds/index/collection scopes leave the active set exactly as it was.
#[allow(clippy::too_many_arguments)]
fn run_rule<S: SimStorage>(
    rule: &Rule<S>,
    delta_time: Duration,
    bounds: &Bounds,
    storage0: &mut S,
    storage1: &mut S,
    actives: &mut HashSet<usize>,
    changed: &mut HashSet<usize>,
    sink: &mut DiagnosticSink,
    pool: Option<&rayon::ThreadPool>,
) {
    let counts_active = matches!(rule.scope(), Some(RuleScope::All | RuleScope::Active));
    let mut updated = HashSet::new();

    match rule {
        Rule::Swap { name, step } => {
            trace!(rule = %name, "swap");
            step.perform(storage0, storage1);
            return;
        }
        Rule::Evaluate { name, scope, step } => {
            let offsets = scope_offsets(bounds, actives, scope);
            trace!(rule = %name, cells = offsets.len(), "evaluate");
            for offset in offsets {
                let cell = CAIndex::new(offset, *bounds);
                let result = step.evaluate(&cell, delta_time, storage0, storage1);
                if result.updated {
                    changed.insert(offset);
                    updated.insert(offset);
                }
                if sink.is_active() && !result.messages.is_empty() {
                    sink.publish(Diagnostic {
                        index: cell.voxel,
                        rule: name.clone(),
                        messages: result.messages,
                    });
                }
            }
        }
        Rule::Cell { name, scope, step } => {
            let offsets = scope_offsets(bounds, actives, scope);
            trace!(rule = %name, cells = offsets.len(), "cell");
            let current: &S = storage0;
            let outcomes: Vec<_> = match pool {
                Some(pool) => pool.install(|| {
                    offsets
                        .par_iter()
                        .map(|&offset| {
                            let cell = CAIndex::new(offset, *bounds);
                            (offset, step.evaluate(&cell, delta_time, current))
                        })
                        .collect()
                }),
                None => offsets
                    .iter()
                    .map(|&offset| {
                        let cell = CAIndex::new(offset, *bounds);
                        (offset, step.evaluate(&cell, delta_time, current))
                    })
                    .collect(),
            };
            for (offset, result) in outcomes {
                if let Some(voxel) = result.voxel {
                    storage1.store_voxel(offset, voxel);
                    changed.insert(offset);
                    updated.insert(offset);
                }
                if sink.is_active() && !result.messages.is_empty() {
                    sink.publish(Diagnostic {
                        index: bounds.delinearize_unchecked(offset),
                        rule: name.clone(),
                        messages: result.messages,
                    });
                }
            }
        }
    }

    if counts_active {
        *actives = updated;
    }
}

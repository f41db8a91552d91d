//! Functional tests driving the engine end to end: active-set behavior,
//! buffer-exchange semantics, suspended ticks, parallel fan-out, and the
//! diagnostic stream. Storage-layout independence is exercised with a
//! parallel-arrays fluid storage alongside the stock [`GridStorage`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::bounds::{Bounds, VoxelIndex};
use crate::engine::Engine;
use crate::index::CAIndex;
use crate::rule::{CellResult, Rule, RuleResult, RuleScope, SwapStep};
use crate::storage::{DenseGrid, GridStorage, SimStorage};

const DT: Duration = Duration::from_millis(16);

fn cube(extent: i32) -> Bounds {
    Bounds::from_origin(VoxelIndex::new(extent - 1, extent - 1, extent - 1)).unwrap()
}

/// Deterministic noise for seeding grids without pulling in an RNG crate.
fn lcg_fill(grid: &mut DenseGrid<u32>, mut state: u32) {
    for v in grid.bounds().indices() {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        grid.set(v, state % 100).unwrap();
    }
}

fn noop() -> Rule<GridStorage<u32>> {
    Rule::cell(
        "noop",
        RuleScope::All,
        |_: &CAIndex, _: Duration, _: &GridStorage<u32>| CellResult::unchanged(),
    )
}

fn increment(scope: RuleScope) -> Rule<GridStorage<u32>> {
    Rule::cell(
        "increment",
        scope,
        |cell: &CAIndex, _: Duration, current: &GridStorage<u32>| {
            CellResult::updated(current.voxel_at(cell.index) + 1)
        },
    )
}

// A rule that never updates anything drains the active set to nothing.
#[test]
fn test_quiescent_rule_empties_active_set() {
    let seed = DenseGrid::new(cube(10), 0u32);
    let mut engine = Engine::new(&seed, vec![noop()]).unwrap();
    assert_eq!(engine.active_count(), 1000);

    engine.tick(DT).unwrap();
    assert_eq!(engine.active_count(), 0);
    assert!(engine.current().iter().all(|&v| v == 0));

    // And it stays quiet.
    engine.tick(DT).unwrap();
    assert_eq!(engine.active_count(), 0);
    assert_eq!(engine.generation(), 2);
}

// An all-scope rule that always updates keeps every cell active.
#[test]
fn test_always_updating_rule_keeps_grid_active() {
    let seed = DenseGrid::new(cube(10), 0u32);
    let mut engine = Engine::new(&seed, vec![increment(RuleScope::All)]).unwrap();

    engine.tick(DT).unwrap();
    assert_eq!(engine.active_count(), 1000);
    engine.tick(DT).unwrap();
    assert_eq!(engine.active_count(), 1000);
}

// From an all-zero seed, an all-scope increment leaves the grid uniformly
// at N after N ticks, even though the rules never copy unwritten cells.
#[test]
fn test_increment_is_uniform_after_n_ticks() {
    let seed = DenseGrid::new(cube(20), 0u32);
    let mut engine = Engine::new(&seed, vec![increment(RuleScope::All)]).unwrap();

    for _ in 0..3 {
        engine.tick(DT).unwrap();
    }
    assert_eq!(engine.generation(), 3);
    assert!(engine.current().iter().all(|&v| v == 3));
}

// Active-scope rules shrink their own footprint as cells settle: a decay
// rule touches only the slab that still holds mass, then goes quiet.
#[test]
fn test_active_scope_decay_settles() {
    let bounds = cube(10);
    let mut seed = DenseGrid::new(bounds, 0u32);
    let slab = Bounds::new(VoxelIndex::new(0, 4, 0), VoxelIndex::new(9, 4, 9)).unwrap();
    seed.fill_region(slab, 3).unwrap();

    let decay = Rule::cell(
        "decay",
        RuleScope::Active,
        |cell: &CAIndex, _: Duration, current: &GridStorage<u32>| {
            match current.voxel_at(cell.index) {
                0 => CellResult::unchanged(),
                v => CellResult::updated(v - 1),
            }
        },
    );
    let mut engine = Engine::new(&seed, vec![decay]).unwrap();

    // First tick sweeps all 1000 cells (everything starts active) but only
    // the 100-cell slab updates.
    engine.tick(DT).unwrap();
    assert_eq!(engine.active_count(), 100);

    engine.tick(DT).unwrap();
    engine.tick(DT).unwrap();
    assert_eq!(engine.active_count(), 100);
    assert!(engine.current().iter().all(|&v| v == 0));

    // Nothing left to decay.
    engine.tick(DT).unwrap();
    assert_eq!(engine.active_count(), 0);
}

// Bounds, index, and collection scopes mutate cells and report changes but
// leave the active set exactly as the last all/active rule left it.
#[test]
fn test_targeted_scopes_never_activate() {
    let bounds = cube(10);
    let seed = DenseGrid::new(bounds, 0u32);
    let patch = Bounds::new(VoxelIndex::new(2, 2, 2), VoxelIndex::new(4, 4, 4)).unwrap();

    let rules = vec![
        increment(RuleScope::Bounds(patch)),
        increment(RuleScope::Index(VoxelIndex::new(9, 9, 9))),
        increment(RuleScope::Collection(vec![
            VoxelIndex::new(0, 0, 0),
            VoxelIndex::new(0, 0, 1),
        ])),
    ];
    let mut engine = Engine::new(&seed, rules).unwrap();

    engine.tick(DT).unwrap();
    // 30 cells updated under targeted scopes, yet the initial full active
    // set is untouched.
    assert_eq!(engine.active_count(), 1000);

    let changes = engine.changes();
    assert_eq!(changes.len(), 27 + 1 + 2);
    assert_eq!(*engine.current().get(VoxelIndex::new(3, 3, 3)).unwrap(), 1);
    assert_eq!(*engine.current().get(VoxelIndex::new(9, 9, 9)).unwrap(), 1);
    assert_eq!(*engine.current().get(VoxelIndex::new(5, 5, 5)).unwrap(), 0);
}

// Each all/active rule replaces the active set as soon as it completes, so
// a later active-scope rule in the same tick iterates the set the previous
// rule just produced, and the last such rule wins.
#[test]
fn test_active_scope_sees_preceding_rule_result() {
    let seed = DenseGrid::new(cube(4), 0u32);
    let visited = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&visited);

    let touch_origin = Rule::cell(
        "touch-origin",
        RuleScope::All,
        |cell: &CAIndex, _: Duration, _: &GridStorage<u32>| {
            if cell.index == 0 {
                CellResult::updated(1)
            } else {
                CellResult::unchanged()
            }
        },
    );
    let count_actives = Rule::cell(
        "count-actives",
        RuleScope::Active,
        move |_: &CAIndex, _: Duration, _: &GridStorage<u32>| {
            counter.fetch_add(1, Ordering::Relaxed);
            CellResult::unchanged()
        },
    );
    let mut engine = Engine::new(&seed, vec![touch_origin, count_actives]).unwrap();

    engine.tick(DT).unwrap();
    // Only the origin, not the previous tick's 64-cell set.
    assert_eq!(visited.load(Ordering::Relaxed), 1);
    // The counting rule updated nothing, and being the last active-scope
    // rule its replacement stands.
    assert_eq!(engine.active_count(), 0);
}

// Rules read neighbor values through the precomputed linear offsets.
#[test]
fn test_neighbor_sums_through_ca_index() {
    let bounds = cube(4);
    let mut seed = DenseGrid::new(bounds, 0u32);
    seed.set(VoxelIndex::new(1, 1, 1), 5).unwrap();

    let gather = Rule::cell(
        "gather",
        RuleScope::All,
        |cell: &CAIndex, _: Duration, current: &GridStorage<u32>| {
            let sum: u32 = cell
                .neighbors_in_bounds()
                .map(|offset| current.voxel_at(offset))
                .sum();
            CellResult::updated(sum)
        },
    );
    let mut engine = Engine::new(&seed, vec![gather]).unwrap();
    engine.tick(DT).unwrap();

    let grid = engine.current();
    // The six face neighbors of (1,1,1) each see the 5; the cell itself
    // sees only zeros; the far corner sees nothing.
    assert_eq!(*grid.get(VoxelIndex::new(0, 1, 1)).unwrap(), 5);
    assert_eq!(*grid.get(VoxelIndex::new(2, 1, 1)).unwrap(), 5);
    assert_eq!(*grid.get(VoxelIndex::new(1, 0, 1)).unwrap(), 5);
    assert_eq!(*grid.get(VoxelIndex::new(1, 1, 2)).unwrap(), 5);
    assert_eq!(*grid.get(VoxelIndex::new(1, 1, 1)).unwrap(), 0);
    assert_eq!(*grid.get(VoxelIndex::new(3, 3, 3)).unwrap(), 0);
}

// A tick driven in budget slices commits the same result as a blocking
// tick, and generation only moves when the last rule finishes.
#[test]
fn test_suspended_tick_matches_blocking_tick() {
    let mut seed = DenseGrid::new(cube(8), 0u32);
    lcg_fill(&mut seed, 7);

    let rules = || {
        vec![
            increment(RuleScope::All),
            noop(),
            increment(RuleScope::Active),
        ]
    };
    let mut blocking = Engine::new(&seed, rules()).unwrap();
    let mut sliced = Engine::new(&seed, rules()).unwrap();

    blocking.tick(DT).unwrap();

    sliced.begin_tick(DT).unwrap();
    let mut slices = 0;
    while !sliced.advance(Duration::ZERO) {
        slices += 1;
        assert_eq!(sliced.generation(), 0);
        assert!(slices < 10);
    }
    assert_eq!(sliced.generation(), 1);
    assert_eq!(sliced.current(), blocking.current());
    assert_eq!(sliced.active_count(), blocking.active_count());
}

// Cell rules produce identical results with and without a worker pool.
#[test]
fn test_parallel_matches_sequential() {
    let mut seed = DenseGrid::new(cube(12), 0u32);
    lcg_fill(&mut seed, 99);

    let rules = || {
        vec![Rule::cell(
            "blur",
            RuleScope::All,
            |cell: &CAIndex, _: Duration, current: &GridStorage<u32>| {
                let own = current.voxel_at(cell.index);
                let sum: u32 = cell
                    .neighbors_in_bounds()
                    .map(|offset| current.voxel_at(offset))
                    .sum();
                CellResult::updated(own / 2 + sum / 6)
            },
        )]
    };
    let mut sequential = Engine::new(&seed, rules()).unwrap();
    let mut parallel = Engine::with_threads(&seed, rules(), 4).unwrap();

    for _ in 0..3 {
        sequential.tick(DT).unwrap();
        parallel.tick(DT).unwrap();
    }
    assert_eq!(sequential.current(), parallel.current());
    assert_eq!(sequential.active_count(), parallel.active_count());
}

// Swap rules run exactly once per tick, independent of the active set, and
// their writes to the next buffer are what gets committed.
#[test]
fn test_swap_runs_unconditionally() {
    let seed = DenseGrid::new(cube(4), 0u32);
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);

    let stamp = Rule::<GridStorage<u32>>::swap(
        "stamp",
        move |_: &mut GridStorage<u32>, next: &mut GridStorage<u32>| {
            counter.fetch_add(1, Ordering::Relaxed);
            next.store_voxel(0, 77);
        },
    );
    let mut engine = Engine::new(&seed, vec![stamp]).unwrap();

    engine.tick(DT).unwrap();
    assert_eq!(runs.load(Ordering::Relaxed), 1);
    assert_eq!(*engine.current().get(VoxelIndex::new(0, 0, 0)).unwrap(), 77);
    // Swap rules never touch the active set: a swap-only tick leaves the
    // initial full set in place.
    assert_eq!(engine.active_count(), 64);
    engine.tick(DT).unwrap();
    assert_eq!(runs.load(Ordering::Relaxed), 2);
}

// Messages attached to rule results arrive on subscribed channels as one
// diagnostic per cell, tagged with the rule name.
#[test]
fn test_diagnostic_stream_delivers_messages() {
    let bounds = cube(4);
    let mut seed = DenseGrid::new(bounds, 0u32);
    seed.set(VoxelIndex::new(2, 0, 0), 50).unwrap();

    let watch = Rule::cell(
        "overflow-watch",
        RuleScope::All,
        |cell: &CAIndex, _: Duration, current: &GridStorage<u32>| {
            let v = current.voxel_at(cell.index);
            if v > 10 {
                CellResult::updated(10).with_message(format!("clamped from {v}"))
            } else {
                CellResult::unchanged()
            }
        },
    );
    let mut engine = Engine::new(&seed, vec![watch]).unwrap();
    let stream = engine.diagnostic_stream();

    engine.tick(DT).unwrap();
    let received: Vec<_> = stream.try_iter().collect();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].index, VoxelIndex::new(2, 0, 0));
    assert_eq!(received[0].rule, "overflow-watch");
    assert_eq!(received[0].messages, vec!["clamped from 50".to_string()]);

    // Quiet cells emit nothing on the next tick.
    engine.tick(DT).unwrap();
    assert_eq!(stream.try_iter().count(), 0);
}

// Evaluate steps may emit diagnostics without updating the cell.
#[test]
fn test_evaluate_failure_reported_not_fatal() {
    let seed = DenseGrid::new(cube(2), 1u32);
    let audit = Rule::evaluate(
        "audit",
        RuleScope::Index(VoxelIndex::new(0, 0, 0)),
        |cell: &CAIndex, _: Duration, current: &GridStorage<u32>, _: &mut GridStorage<u32>| {
            if current.voxel_at(cell.index) != 0 {
                RuleResult::failed("expected empty origin")
            } else {
                RuleResult::unchanged()
            }
        },
    );
    let mut engine = Engine::new(&seed, vec![audit]).unwrap();
    let stream = engine.diagnostic_stream();

    engine.tick(DT).unwrap();
    assert_eq!(engine.generation(), 1);
    let received: Vec<_> = stream.try_iter().collect();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].messages, vec!["expected empty origin".to_string()]);
    assert!(engine.changes().is_empty());
}

// --- parallel-arrays storage -----------------------------------------------
//
// A structure-of-arrays layout with two fields. The engine only ever talks
// to it through the trait, so everything above holds for it too; here it
// backs an evaluate rule that writes a neighbor cell and a swap that
// exchanges one field wholesale.

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Fluid {
    mass: f32,
    inflow: f32,
}

struct FluidColumns {
    bounds: Bounds,
    mass: Vec<f32>,
    inflow: Vec<f32>,
}

impl FluidColumns {
    fn inflow_mut(&mut self) -> &mut Vec<f32> {
        &mut self.inflow
    }
}

impl SimStorage for FluidColumns {
    type Voxel = Fluid;

    fn from_seed(seed: &DenseGrid<Fluid>) -> Self {
        FluidColumns {
            bounds: seed.bounds(),
            mass: seed.iter().map(|f| f.mass).collect(),
            inflow: seed.iter().map(|f| f.inflow).collect(),
        }
    }

    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn default_voxel(&self) -> Fluid {
        Fluid::default()
    }

    fn voxel_at(&self, offset: usize) -> Fluid {
        Fluid {
            mass: self.mass[offset],
            inflow: self.inflow[offset],
        }
    }

    fn store_voxel(&mut self, offset: usize, voxel: Fluid) {
        self.mass[offset] = voxel.mass;
        self.inflow[offset] = voxel.inflow;
    }
}

// Mass drains one unit per tick toward the cell below; the evaluate step
// records the transfer in the receiving cell's inflow, writing a neighbor
// slot in the next buffer. A swap then folds inflow into mass for the
// coming generation.
#[test]
fn test_soa_storage_with_cross_cell_writes() {
    let bounds = cube(3);
    let mut seed = DenseGrid::new(bounds, Fluid::default());
    seed.set(VoxelIndex::new(1, 2, 1), Fluid { mass: 2.0, inflow: 0.0 })
        .unwrap();

    let drain = Rule::evaluate(
        "drain",
        RuleScope::All,
        |cell: &CAIndex, _: Duration, current: &FluidColumns, next: &mut FluidColumns| {
            let own = current.voxel_at(cell.index);
            if own.mass < 1.0 || cell.yl < 0 {
                return RuleResult::unchanged();
            }
            let below = cell.yl as usize;
            next.store_voxel(
                cell.index,
                Fluid {
                    mass: own.mass - 1.0,
                    inflow: 0.0,
                },
            );
            let mut receiving = next.voxel_at(below);
            receiving.inflow += 1.0;
            next.store_voxel(below, receiving);
            RuleResult::updated()
        },
    );
    let settle = Rule::<FluidColumns>::swap(
        "settle",
        |current: &mut FluidColumns, next: &mut FluidColumns| {
            for (mass, inflow) in next.mass.iter_mut().zip(next.inflow.iter_mut()) {
                *mass += *inflow;
                *inflow = 0.0;
            }
            current.inflow_mut().iter_mut().for_each(|f| *f = 0.0);
        },
    );

    let mut engine = Engine::new(&seed, vec![drain, settle]).unwrap();
    engine.tick(DT).unwrap();

    let grid = engine.current();
    assert_eq!(grid.get(VoxelIndex::new(1, 2, 1)).unwrap().mass, 1.0);
    assert_eq!(grid.get(VoxelIndex::new(1, 1, 1)).unwrap().mass, 1.0);
    assert_eq!(engine.active_count(), 1);

    // Both holding cells drain on the second tick; mass is conserved.
    engine.tick(DT).unwrap();
    let grid = engine.current();
    assert_eq!(grid.get(VoxelIndex::new(1, 2, 1)).unwrap().mass, 0.0);
    assert_eq!(grid.get(VoxelIndex::new(1, 1, 1)).unwrap().mass, 1.0);
    assert_eq!(grid.get(VoxelIndex::new(1, 0, 1)).unwrap().mass, 1.0);
    let total: f32 = grid.iter().map(|f| f.mass).sum();
    assert_eq!(total, 2.0);
}

// A field swap between two buffers only flips which buffer holds which
// values; the combined multiset of values is untouched.
#[test]
fn test_swap_preserves_value_multiset() {
    let bounds = cube(3);
    let mut seed_a = DenseGrid::new(bounds, Fluid::default());
    let mut seed_b = DenseGrid::new(bounds, Fluid::default());
    for (i, v) in bounds.indices().enumerate() {
        seed_a
            .set(v, Fluid { mass: i as f32, inflow: 0.0 })
            .unwrap();
        seed_b
            .set(v, Fluid { mass: 1000.0 + i as f32, inflow: 0.0 })
            .unwrap();
    }
    let mut a = FluidColumns::from_seed(&seed_a);
    let mut b = FluidColumns::from_seed(&seed_b);

    let mut combined: Vec<f32> = a.mass.iter().chain(b.mass.iter()).copied().collect();
    combined.sort_by(f32::total_cmp);

    let exchange = |x: &mut FluidColumns, y: &mut FluidColumns| {
        std::mem::swap(&mut x.mass, &mut y.mass);
    };
    exchange.perform(&mut a, &mut b);

    // Assignments flipped wholesale.
    assert_eq!(a.current(), seed_b);
    assert_eq!(b.current(), seed_a);

    let mut after: Vec<f32> = a.mass.iter().chain(b.mass.iter()).copied().collect();
    after.sort_by(f32::total_cmp);
    assert_eq!(combined, after);
}

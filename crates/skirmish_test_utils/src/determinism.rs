//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Sources of non-determinism include:
//!
//! - **Floating-point math**: fixed-point arithmetic via
//!   [`skirmish_core::math::Fixed`] is used throughout.
//!
//! - **HashMap iteration order**: entity collections are ordered maps and
//!   are always scanned in handle order.
//!
//! - **System randomness**: all random choices draw from the simulation's
//!   seeded source.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: individual behaviours are reproducible
//! 2. **Property tests**: random seeds and maps still produce deterministic outputs
//! 3. **Parallel tests**: running N simulations on threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use skirmish_core::simulation::Simulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one tick
/// * `hash` - Function to compute state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Run a [`Simulation`] twice from the same set-up and compare final hashes.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim| {
            sim.tick();
        },
        Simulation::state_hash,
    )
    .is_deterministic
}

/// Run N simulations on scoped threads and collect the final hashes.
///
/// # Panics
///
/// Panics if a simulation thread panics.
pub fn run_parallel_simulations<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> DeterminismResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    for _ in 0..num_ticks {
                        sim.tick();
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks: num_ticks,
    }
}

/// Compare two simulation runs tick-by-tick, finding first divergence.
///
/// # Returns
///
/// `None` if simulations are deterministic, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    if sim1.state_hash() != sim2.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        let events1 = sim1.tick();
        let events2 = sim2.tick();

        if sim1.state_hash() != sim2.state_hash() {
            tracing::debug!(tick, ?events1, ?events2, "Simulations diverged");
            return Some(tick);
        }
    }

    None
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for simulation inputs.
pub mod strategies {
    use proptest::prelude::*;
    use skirmish_core::economy::{ResourceBundle, ResourceKind};
    use skirmish_core::maps::DepositSpec;
    use skirmish_core::terrain::{CellPos, TerrainCode};

    /// A cell inside a `width` x `height` grid.
    pub fn arb_cell(width: i32, height: i32) -> impl Strategy<Value = CellPos> {
        (0..width, 0..height).prop_map(|(x, y)| CellPos::new(x, y))
    }

    /// Any terrain code, weighted toward open ground.
    pub fn arb_terrain() -> impl Strategy<Value = TerrainCode> {
        prop_oneof![
            6 => Just(TerrainCode::Grass),
            1 => Just(TerrainCode::Sand),
            2 => Just(TerrainCode::Rock),
            1 => Just(TerrainCode::Water),
        ]
    }

    /// Terrain rows in map text form (`.` grass, `:` sand, `#` rock, `~` water).
    pub fn arb_terrain_rows(width: usize, height: usize) -> impl Strategy<Value = Vec<String>> {
        let row = proptest::collection::vec(arb_terrain(), width)
            .prop_map(|codes| codes.into_iter().map(TerrainCode::symbol).collect::<String>());
        proptest::collection::vec(row, height)
    }

    /// Any resource kind.
    pub fn arb_resource_kind() -> impl Strategy<Value = ResourceKind> {
        prop::sample::select(ResourceKind::ALL.to_vec())
    }

    /// Balances up to `max` of each kind.
    pub fn arb_bundle(max: u32) -> impl Strategy<Value = ResourceBundle> {
        (0..=max, 0..=max, 0..=max, 0..=max)
            .prop_map(|(gold, wood, stone, metal)| ResourceBundle::new(gold, wood, stone, metal))
    }

    /// A deposit inside the grid.
    pub fn arb_deposit(width: i32, height: i32) -> impl Strategy<Value = DepositSpec> {
        (arb_resource_kind(), arb_cell(width, height), 1u32..500)
            .prop_map(|(kind, cell, amount)| DepositSpec { kind, cell, amount })
    }

    /// Generate health values (1-1000).
    pub fn arb_health() -> impl Strategy<Value = u32> {
        1u32..1000u32
    }

    /// Generate damage values (1-100).
    pub fn arb_damage() -> impl Strategy<Value = u32> {
        1u32..100u32
    }

    /// Simulation seeds.
    pub fn arb_seed() -> impl Strategy<Value = u64> {
        any::<u64>()
    }
}

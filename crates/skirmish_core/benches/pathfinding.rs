//! Pathfinding and tick benchmarks for skirmish_core.
//!
//! Run with: `cargo bench -p skirmish_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use skirmish_core::maps::MissionMap;
use skirmish_core::pathfinding::{find_path, ObstacleSet};
use skirmish_core::simulation::{FactionSetup, MissionSetup, Simulation};
use skirmish_core::terrain::{CellPos, MovementClass, TerrainCode, TerrainGrid};

/// Vertical walls with alternating gaps at the top and bottom.
fn serpentine(size: u32) -> TerrainGrid {
    let last = size as i32 - 1;
    TerrainGrid::from_fn(size, size, |CellPos { x, y }| {
        let wall = x % 8 == 4;
        let gap = if (x / 8) % 2 == 0 { y == last } else { y == 0 };
        if wall && !gap {
            TerrainCode::Water
        } else {
            TerrainCode::Grass
        }
    })
}

pub fn pathfinding_benchmark(c: &mut Criterion) {
    let obstacles = ObstacleSet::new();
    let mut group = c.benchmark_group("find_path");
    for size in [32u32, 64, 100] {
        let open = TerrainGrid::from_fn(size, size, |_| TerrainCode::Grass);
        let maze = serpentine(size);
        let goal = CellPos::new(size as i32 - 1, size as i32 - 1);

        group.bench_with_input(BenchmarkId::new("open", size), &open, |b, grid| {
            b.iter(|| {
                find_path(
                    MovementClass::FOOT,
                    black_box(CellPos::new(0, 0)),
                    black_box(goal),
                    grid,
                    &obstacles,
                )
            });
        });
        group.bench_with_input(BenchmarkId::new("serpentine", size), &maze, |b, grid| {
            b.iter(|| {
                find_path(
                    MovementClass::FOOT,
                    black_box(CellPos::new(0, 0)),
                    black_box(goal),
                    grid,
                    &obstacles,
                )
            });
        });
    }
    group.finish();
}

pub fn tick_benchmark(c: &mut Criterion) {
    let setup = || {
        let setup = MissionSetup::new(
            MissionMap::glade(),
            vec![FactionSetup::computer("red"), FactionSetup::computer("blue")],
        )
        .with_seed(1);
        let mut sim = Simulation::new(setup).expect("glade is valid");
        for _ in 0..600 {
            sim.tick();
        }
        sim
    };
    let warmed = setup();
    c.bench_function("skirmish_tick", |b| {
        b.iter_batched(
            || warmed.clone(),
            |mut sim| black_box(sim.tick()),
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, pathfinding_benchmark, tick_benchmark);
criterion_main!(benches);

//! Benchmarks for the enclosure engine and the simulation loop.
//!
//! The flood fill runs after every wall placement, so it dominates busy
//! AI ticks; the full-run benches track the loop as a whole.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::hint::black_box;

use bastion::game::territory::{FloodFillDetector, generate_initial_walls, place_wall};
use bastion::game::{EnclosureDetector, Kingdom, Resources};
use bastion::sim::new_simulation;
use bastion::{Coord, SimulationConfig, SimulationState, run_simulation};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

fn ringed_world(size: u16) -> SimulationState {
    let mut state = SimulationState::new(SimulationConfig {
        map_size: size,
        ..SimulationConfig::default()
    })
    .unwrap();
    let capital = Coord::new(size / 2, size / 2);
    state
        .kingdoms
        .push(Kingdom::new(0, 0, capital, Resources::new(10_000, 10_000, 0)));
    generate_initial_walls(&mut state, 0);
    state
}

fn bench_flood_fill(c: &mut Criterion) {
    let small = ringed_world(100);
    let large = ringed_world(200);

    c.bench_function("flood_fill_100", |b| {
        b.iter(|| black_box(FloodFillDetector.enclosed(black_box(&small.map), 0)));
    });
    c.bench_function("flood_fill_200", |b| {
        b.iter(|| black_box(FloodFillDetector.enclosed(black_box(&large.map), 0)));
    });
}

fn bench_wall_placement(c: &mut Criterion) {
    let base = ringed_world(100);
    // Left of the ring on 46..=53; connects through the west wall.
    let site = Coord::new(45, 50);

    c.bench_function("place_wall_100", |b| {
        b.iter_batched(
            || base.clone(),
            |mut state| black_box(place_wall(&mut state, &FloodFillDetector, 0, site)),
            BatchSize::SmallInput,
        );
    });
}

fn bench_simulation_minute(c: &mut Criterion) {
    let config = SimulationConfig {
        map_size: 100,
        ..SimulationConfig::default()
    };

    c.bench_function("simulation_60s", |b| {
        b.iter_batched(
            || new_simulation(42, &config).unwrap(),
            |mut sim| black_box(sim.run_for(60_000)),
            BatchSize::LargeInput,
        );
    });
}

fn bench_full_run(c: &mut Criterion) {
    let config = SimulationConfig {
        map_size: 64,
        duration_ms: 120_000,
        ..SimulationConfig::default()
    };

    let mut group = c.benchmark_group("full_run");
    group.sample_size(10);
    group.bench_function("run_simulation_64_120s", |b| {
        b.iter(|| black_box(run_simulation(black_box(7), black_box(&config))));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_flood_fill,
    bench_wall_placement,
    bench_simulation_minute,
    bench_full_run,
);
criterion_main!(benches);

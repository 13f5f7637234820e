//! Benchmarks for the per-tick passes.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec3;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use roostswarm_core::swarm::pool::BoidPool;
use roostswarm_core::utils::benchmark::floor_perches;
use roostswarm_core::{GridGeometry, PerchTree, RoostSimulation, SimConfig, SpatialIndex};

fn quiet_config() -> SimConfig {
    let mut config = SimConfig::default();
    config.log_every = 0;
    config
}

fn bench_index_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_rebuild");
    let config = quiet_config();
    let grid = GridGeometry::from_boundary(&config.boundary, config.flock.view_radius);

    for &n in &[1_000usize, 10_000] {
        let mut rng = SmallRng::seed_from_u64(n as u64);
        let mut pool = BoidPool::with_capacity(n);
        pool.spawn_random(n, &config.boundary, &config.flock, &config.lander, &mut rng)
            .unwrap();
        let mut records = Vec::new();
        pool.fill_flocking_records(&mut records);
        let mut index = SpatialIndex::default();

        group.bench_with_input(BenchmarkId::from_parameter(n), &records, |b, records| {
            b.iter(|| {
                index.rebuild(grid, records);
                black_box(index.active_cells().len())
            })
        });
    }
    group.finish();
}

fn bench_full_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_tick");
    group.sample_size(20);

    for &n in &[1_000usize, 5_000] {
        let config = quiet_config();
        let perches = floor_perches(&config, 2.0);
        let mut sim =
            RoostSimulation::with_agents(config, perches, n).expect("default config is valid");
        group.bench_function(BenchmarkId::from_parameter(n), |b| {
            b.iter(|| black_box(sim.step(1.0 / 60.0)))
        });
    }
    group.finish();
}

fn bench_perch_query(c: &mut Criterion) {
    let config = quiet_config();
    let tree = PerchTree::build(floor_perches(&config, 0.5));
    c.bench_function("perch_nearest_unoccupied", |b| {
        b.iter(|| black_box(tree.nearest_unoccupied(black_box(Vec3::new(3.3, 10.0, -7.1)))))
    });
}

criterion_group!(benches, bench_index_rebuild, bench_full_tick, bench_perch_query);
criterion_main!(benches);

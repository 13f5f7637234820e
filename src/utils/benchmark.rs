use crate::core::config::SimConfig;
use crate::core::error::RoostError;
use crate::swarm::master_pipeline::RoostSimulation;
use crate::swarm::perch::PerchPoint;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Headless run parameters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BenchmarkSpec {
    pub agents: usize,
    pub ticks: u64,
    pub dt: f32,
    /// Spacing of the generated ground-plane perch lattice. Zero disables perches.
    pub perch_spacing: f32,
}

impl Default for BenchmarkSpec {
    fn default() -> Self {
        BenchmarkSpec {
            agents: 5_000,
            ticks: 600,
            dt: 1.0 / 60.0,
            perch_spacing: 2.0,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkReport {
    pub agents: usize,
    pub perches: usize,
    pub ticks: u64,
    pub total_ms: f64,
    pub mean_tick_ms: f64,
    pub max_tick_ms: f64,
    pub peak_landed: usize,
    pub takeoffs: usize,
    pub landings: usize,
}

/// Perch lattice across the floor of the boundary's calm interior.
pub fn floor_perches(config: &SimConfig, spacing: f32) -> Vec<PerchPoint> {
    if spacing <= 0.0 {
        return Vec::new();
    }
    let (lo, hi) = config.boundary.inner_bounds();
    let nx = ((hi.x - lo.x) / spacing).floor() as usize + 1;
    let nz = ((hi.z - lo.z) / spacing).floor() as usize + 1;
    let mut points = Vec::with_capacity(nx * nz);
    for i in 0..nx {
        for k in 0..nz {
            let position = Vec3::new(lo.x + i as f32 * spacing, lo.y, lo.z + k as f32 * spacing);
            points.push(PerchPoint::new(position, Vec3::Y));
        }
    }
    points
}

/// Drive a simulation for `spec.ticks` steps and time every tick.
pub fn run_headless(config: SimConfig, spec: &BenchmarkSpec) -> Result<BenchmarkReport, RoostError> {
    let perches = floor_perches(&config, spec.perch_spacing);
    let perch_count = perches.len();

    info!(
        "📊 Running headless benchmark: {} agents, {} perches, {} ticks",
        spec.agents, perch_count, spec.ticks
    );
    let mut sim = RoostSimulation::with_agents(config, perches, spec.agents)?;

    let mut report = BenchmarkReport {
        agents: spec.agents,
        perches: perch_count,
        ticks: spec.ticks,
        ..BenchmarkReport::default()
    };

    let start = Instant::now();
    for _ in 0..spec.ticks {
        let t = Instant::now();
        let stats = sim.step(spec.dt);
        let ms = t.elapsed().as_secs_f64() * 1000.0;

        report.max_tick_ms = report.max_tick_ms.max(ms);
        report.peak_landed = report.peak_landed.max(stats.landed);
        report.takeoffs += stats.released;
        report.landings += stats.occupied;
    }
    report.total_ms = start.elapsed().as_secs_f64() * 1000.0;
    report.mean_tick_ms = if spec.ticks > 0 {
        report.total_ms / spec.ticks as f64
    } else {
        0.0
    };

    info!(
        "📈 Benchmark Complete. mean {:.3} ms/tick, max {:.3} ms ({} landings, {} takeoffs)",
        report.mean_tick_ms, report.max_tick_ms, report.landings, report.takeoffs
    );
    Ok(report)
}

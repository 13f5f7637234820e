use super::avoidance::AvoidanceDirections;
use super::flocking::{run_flocking_pass, FlockingKernel};
use super::flowfield::FlowField;
use super::grid::GridGeometry;
use super::lander::{self, Kinematics, LanderContext, LanderEffect, LanderState, StartleBuffer};
use super::math::{facing, EPSILON};
use super::perch::{PerchPoint, PerchTree, PerchUpdate};
use super::pool::BoidPool;
use super::spatial::{AgentRecord, SpatialIndex};
use crate::core::config::SimConfig;
use crate::core::error::RoostError;
use glam::Vec3;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Summary of one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TickStats {
    pub tick: u64,
    pub alive: usize,
    pub flocking: usize,
    pub active_cells: usize,
    pub landing: usize,
    pub docking: usize,
    pub landed: usize,
    /// Perch reservations made this tick.
    pub occupied: usize,
    /// Perch reservations released this tick.
    pub released: usize,
    /// Startle events raised this tick (read next tick).
    pub startles: usize,
    pub elapsed_micros: u64,
}

/// The per-tick orchestrator for a perching flock.
/// Owns the agents and every acceleration structure they share.
pub struct RoostSimulation {
    pub config: SimConfig,
    pub pool: BoidPool,
    index: SpatialIndex,
    perches: PerchTree,
    startles: StartleBuffer,
    flow: Option<FlowField>,
    directions: AvoidanceDirections,
    rng: SmallRng,
    tick: u64,

    // Scratch reused across ticks
    records: Vec<AgentRecord>,
    steered: Vec<Vec3>,
    effects: Vec<LanderEffect>,
    updates: Vec<PerchUpdate>,
}

impl RoostSimulation {
    pub fn new(config: SimConfig, perches: Vec<PerchPoint>) -> Result<Self, RoostError> {
        config.validate()?;
        let rng = SmallRng::seed_from_u64(config.seed);
        let perches = PerchTree::build(perches);

        info!(
            "[Roost] Simulation ready: {} perches, boundary {:?} at {:?}, view radius {}",
            perches.len(),
            config.boundary.size,
            config.boundary.center,
            config.flock.view_radius
        );

        Ok(Self {
            config,
            pool: BoidPool::new(),
            index: SpatialIndex::default(),
            perches,
            startles: StartleBuffer::new(),
            flow: None,
            directions: AvoidanceDirections::default(),
            rng,
            tick: 0,
            records: Vec::new(),
            steered: Vec::new(),
            effects: Vec::new(),
            updates: Vec::new(),
        })
    }

    /// Simulation with `agents` randomly placed flyers.
    pub fn with_agents(
        config: SimConfig,
        perches: Vec<PerchPoint>,
        agents: usize,
    ) -> Result<Self, RoostError> {
        let mut sim = Self::new(config, perches)?;
        sim.spawn_random(agents)?;
        Ok(sim)
    }

    pub fn spawn_random(&mut self, count: usize) -> Result<Vec<u32>, RoostError> {
        let cfg = &self.config;
        self.pool
            .spawn_random(count, &cfg.boundary, &cfg.flock, &cfg.lander, &mut self.rng)
    }

    /// Spawn one flyer with randomly rolled traits.
    pub fn spawn(&mut self, position: Vec3, velocity: Vec3) -> Result<u32, RoostError> {
        let cfg = &self.config.lander;
        let metabolism = Uniform::new_inclusive(cfg.metabolism_min, cfg.metabolism_max);
        let personality = Uniform::new_inclusive(0.0f32, 1.0);
        let record = lander::Lander::new(
            cfg,
            metabolism.sample(&mut self.rng),
            personality.sample(&mut self.rng),
        );
        self.pool.spawn(position, velocity, record)
    }

    pub fn kill(&mut self, id: u32) -> bool {
        self.pool.kill(id)
    }

    /// Reclaim dead slots, releasing any perches they held. Returns the
    /// number of slots reclaimed.
    pub fn cleanup_dead(&mut self) -> usize {
        let before = self.pool.len();
        let released = self.pool.compact();
        self.perches.apply(released);
        before - self.pool.len()
    }

    /// Record the externally computed avoidance direction for an agent.
    pub fn set_avoidance(&mut self, id: u32, direction: Option<u32>) -> bool {
        match self.pool.slot_of(id) {
            Some(slot) => {
                self.pool.avoidance[slot] = direction;
                true
            }
            None => false,
        }
    }

    pub fn set_flow_field(&mut self, field: Option<FlowField>) {
        self.flow = field;
    }

    pub fn set_avoidance_directions(&mut self, directions: AvoidanceDirections) {
        self.directions = directions;
    }

    pub fn avoidance_directions(&self) -> &AvoidanceDirections {
        &self.directions
    }

    pub fn perches(&self) -> &PerchTree {
        &self.perches
    }

    #[cfg(test)]
    pub(crate) fn perches_mut(&mut self) -> &mut PerchTree {
        &mut self.perches
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn startles(&self) -> &StartleBuffer {
        &self.startles
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// One simulation tick: index rebuild, steering, lander pass, deferred
    /// perch updates, startle swap. Positions are left to the integrator.
    pub fn tick(&mut self, dt: f32) -> TickStats {
        let start = Instant::now();
        self.tick += 1;

        // ── 1. Index + steering over the flocking pool ───────────────────────
        self.pool.fill_flocking_records(&mut self.records);
        if self.records.is_empty() {
            self.index.clear();
        } else {
            let grid =
                GridGeometry::from_boundary(&self.config.boundary, self.config.flock.view_radius);
            self.index.rebuild(grid, &self.records);

            let kernel = FlockingKernel {
                config: &self.config.flock,
                boundary: &self.config.boundary,
                flow: self.flow.as_ref(),
                directions: &self.directions,
                index: &self.index,
                dt,
            };
            run_flocking_pass(&mut self.pool, &self.records, &kernel, &mut self.steered);
        }

        // ── 2. Lander pass ───────────────────────────────────────────────────
        let ctx = LanderContext {
            config: &self.config.lander,
            tree: &self.perches,
            startles: &self.startles,
            dt,
            seed: self.config.seed,
            tick: self.tick,
        };
        let pool = &mut self.pool;
        pool.lander
            .par_iter_mut()
            .zip(pool.position.par_iter_mut())
            .zip(pool.velocity.par_iter_mut())
            .zip(pool.rotation.par_iter_mut())
            .zip(pool.ids.par_iter().zip(pool.alive.par_iter()))
            .map(|((((record, position), velocity), rotation), (&id, &alive))| {
                if !alive {
                    return LanderEffect::default();
                }
                let mut body = Kinematics {
                    position: *position,
                    velocity: *velocity,
                    rotation: *rotation,
                };
                let effect = lander::step(record, &mut body, id, &ctx);
                *position = body.position;
                *velocity = body.velocity;
                *rotation = body.rotation;
                effect
            })
            .collect_into_vec(&mut self.effects);

        // ── 3. Deferred effects, single-threaded ─────────────────────────────
        let mut stats = TickStats::default();
        self.updates.clear();
        for (slot, effect) in self.effects.iter().enumerate() {
            if let Some(update) = effect.perch {
                match update {
                    PerchUpdate::Occupy(_) => stats.occupied += 1,
                    PerchUpdate::Free(_) => stats.released += 1,
                }
                self.updates.push(update);
            }
            if let Some(member) = effect.flocking {
                self.pool.flocking[slot] = member;
            }
        }
        self.perches.apply(self.updates.drain(..));

        stats.startles = self.startles.pending();
        self.startles.swap();

        // ── 4. Stats ─────────────────────────────────────────────────────────
        stats.tick = self.tick;
        stats.alive = self.pool.alive_count();
        stats.flocking = self.pool.flocking_count();
        stats.active_cells = self.index.active_cells().len();
        stats.landing = self.pool.count_state(LanderState::Landing);
        stats.docking = self.pool.count_state(LanderState::Docking);
        stats.landed = self.pool.count_state(LanderState::Landed);
        stats.elapsed_micros = start.elapsed().as_micros() as u64;

        if stats.occupied > 0 || stats.released > 0 {
            debug!(
                "[Roost] Tick {}: {} perches taken, {} released, {} startles",
                self.tick, stats.occupied, stats.released, stats.startles
            );
        }
        if self.config.log_every > 0 && self.tick % self.config.log_every == 0 {
            info!(
                "[Roost] Tick {}: {} alive ({} flocking, {} landed) over {} cells in {}us",
                self.tick,
                stats.alive,
                stats.flocking,
                stats.landed,
                stats.active_cells,
                stats.elapsed_micros
            );
        }
        stats
    }

    /// Default integrator: airborne agents advance along their velocity and
    /// turn to face it. Docking and landed agents are posed by the lander.
    pub fn integrate(&mut self, dt: f32) {
        let pool = &mut self.pool;
        pool.position
            .par_iter_mut()
            .zip(pool.rotation.par_iter_mut())
            .zip(pool.velocity.par_iter())
            .zip(pool.alive.par_iter().zip(pool.lander.par_iter()))
            .for_each(|(((position, rotation), velocity), (&alive, lander))| {
                if !alive || !lander.state.is_airborne() {
                    return;
                }
                *position += *velocity * dt;
                if velocity.length_squared() > EPSILON * EPSILON {
                    *rotation = facing(*velocity);
                }
            });
    }

    /// `tick` followed by `integrate`.
    pub fn step(&mut self, dt: f32) -> TickStats {
        let stats = self.tick(dt);
        self.integrate(dt);
        stats
    }
}

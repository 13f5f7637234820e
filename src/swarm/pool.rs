//! Boid Pool
//!
//! Struct-of-arrays agent storage. Every column has one entry per slot; slot
//! order follows spawn order, so `ids` stays sorted and lookups by id are a
//! binary search. Dead agents keep their slot until [`BoidPool::compact`].

use super::boundary::Boundary;
use super::lander::{Lander, LanderState};
use super::math::facing;
use super::perch::PerchUpdate;
use super::spatial::AgentRecord;
use crate::core::config::{FlockConfig, LanderConfig};
use crate::core::error::RoostError;
use glam::{Quat, Vec3};
use rand::Rng;
use rand_distr::{Distribution, Uniform, UnitSphere};
use rayon::prelude::*;
use tracing::debug;

#[derive(Default)]
pub struct BoidPool {
    pub ids: Vec<u32>,
    pub position: Vec<Vec3>,
    pub velocity: Vec<Vec3>,
    pub rotation: Vec<Quat>,
    pub alive: Vec<bool>,
    /// Member of the flocking pool (indexed and steered this tick).
    pub flocking: Vec<bool>,
    /// Externally computed avoidance direction, `None` when the way is clear.
    pub avoidance: Vec<Option<u32>>,
    pub lander: Vec<Lander>,
    next_id: u32,
}

impl BoidPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        BoidPool {
            ids: Vec::with_capacity(capacity),
            position: Vec::with_capacity(capacity),
            velocity: Vec::with_capacity(capacity),
            rotation: Vec::with_capacity(capacity),
            alive: Vec::with_capacity(capacity),
            flocking: Vec::with_capacity(capacity),
            avoidance: Vec::with_capacity(capacity),
            lander: Vec::with_capacity(capacity),
            next_id: 0,
        }
    }

    /// Slot count, dead slots included.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn alive_count(&self) -> usize {
        self.alive.iter().filter(|&&a| a).count()
    }

    pub fn flocking_count(&self) -> usize {
        self.alive
            .iter()
            .zip(&self.flocking)
            .filter(|(&a, &f)| a && f)
            .count()
    }

    /// Add one flying agent facing its velocity. Returns its id.
    ///
    /// Ids are never reused, so a pool hands out at most `u32::MAX` of them.
    pub fn spawn(
        &mut self,
        position: Vec3,
        velocity: Vec3,
        lander: Lander,
    ) -> Result<u32, RoostError> {
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(RoostError::IdsExhausted(id))?;

        self.ids.push(id);
        self.position.push(position);
        self.velocity.push(velocity);
        self.rotation.push(facing(velocity));
        self.alive.push(true);
        self.flocking.push(true);
        self.avoidance.push(None);
        self.lander.push(lander);
        Ok(id)
    }

    /// Spawn `count` agents uniformly inside the boundary's calm interior,
    /// heading in random directions at a random legal speed.
    pub fn spawn_random<R: Rng>(
        &mut self,
        count: usize,
        boundary: &Boundary,
        flock: &FlockConfig,
        lander: &LanderConfig,
        rng: &mut R,
    ) -> Result<Vec<u32>, RoostError> {
        let (lo, hi) = boundary.inner_bounds();
        let speed = Uniform::new_inclusive(flock.min_speed, flock.max_speed);
        let metabolism = Uniform::new_inclusive(lander.metabolism_min, lander.metabolism_max);
        let personality = Uniform::new_inclusive(0.0f32, 1.0);

        let ids = (0..count)
            .map(|_| {
                let t = Vec3::new(rng.gen(), rng.gen(), rng.gen());
                let position = lo + (hi - lo) * t;
                let heading = Vec3::from_array(UnitSphere.sample(rng));
                let velocity = heading * speed.sample(rng);
                let record = Lander::new(lander, metabolism.sample(rng), personality.sample(rng));
                self.spawn(position, velocity, record)
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!("[Pool] Spawned {} agents ({} slots)", count, self.len());
        Ok(ids)
    }

    pub fn slot_of(&self, id: u32) -> Option<usize> {
        self.ids.binary_search(&id).ok()
    }

    /// Mark an agent dead. It stops being indexed, steered and integrated
    /// immediately; its storage is reclaimed by [`compact`](Self::compact).
    pub fn kill(&mut self, id: u32) -> bool {
        match self.slot_of(id) {
            Some(slot) if self.alive[slot] => {
                self.alive[slot] = false;
                self.flocking[slot] = false;
                true
            }
            _ => false,
        }
    }

    /// Drop dead slots, keeping the order of survivors. Returns the perch
    /// releases owed by agents that died while holding one.
    pub fn compact(&mut self) -> Vec<PerchUpdate> {
        let released: Vec<PerchUpdate> = self
            .alive
            .iter()
            .zip(&self.lander)
            .filter(|(&alive, _)| !alive)
            .filter_map(|(_, l)| l.held_perch().map(PerchUpdate::Free))
            .collect();

        let before = self.len();
        let keep = self.alive.clone();
        retain_by(&mut self.ids, &keep);
        retain_by(&mut self.position, &keep);
        retain_by(&mut self.velocity, &keep);
        retain_by(&mut self.rotation, &keep);
        retain_by(&mut self.flocking, &keep);
        retain_by(&mut self.avoidance, &keep);
        retain_by(&mut self.lander, &keep);
        retain_by(&mut self.alive, &keep);

        let removed = before - self.len();
        if removed > 0 {
            debug!(
                "[Pool] Compacted {} dead agents, {} perches released",
                removed,
                released.len()
            );
        }
        released
    }

    /// Frame snapshot of every live flocking agent, for the index rebuild.
    pub fn fill_flocking_records(&self, out: &mut Vec<AgentRecord>) {
        out.clear();
        out.par_extend(
            self.ids
                .par_iter()
                .zip(self.position.par_iter())
                .zip(self.velocity.par_iter())
                .zip(self.alive.par_iter().zip(self.flocking.par_iter()))
                .enumerate()
                .filter(|(_, (_, (&alive, &flocking)))| alive && flocking)
                .map(|(slot, (((&id, &position), &velocity), _))| AgentRecord {
                    id,
                    slot: slot as u32,
                    position,
                    velocity,
                }),
        );
    }

    /// Agents currently in `state`, alive only.
    pub fn count_state(&self, state: LanderState) -> usize {
        self.alive
            .iter()
            .zip(&self.lander)
            .filter(|(&a, l)| a && l.state == state)
            .count()
    }
}

fn retain_by<T>(column: &mut Vec<T>, keep: &[bool]) {
    let mut flags = keep.iter();
    column.retain(|_| flags.next().copied().unwrap_or(false));
}

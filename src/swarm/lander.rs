//! Lander State Machine
//!
//! Per-agent perch lifecycle: `Flying → Landing → Docking → Landed → Flying`.
//!
//! Transitions run inside a parallel pass. Each one mutates only its own
//! agent and returns a [`LanderEffect`]. Occupancy changes and pool
//! membership are applied afterwards on one thread. Startle broadcasts go
//! through a double-buffered queue, so an event raised on tick N is seen
//! on tick N+1.

use super::math::{exp_blend, facing, look_rotation, safe_normalize};
use super::perch::{PerchTree, PerchUpdate};
use crate::core::config::LanderConfig;
use glam::{Quat, Vec3};
use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, UnitSphere};
use serde::{Deserialize, Serialize};

/// Jitter added to the takeoff direction, before normalization.
const TAKEOFF_JITTER: f32 = 0.25;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LanderState {
    Flying,
    Landing,
    Docking,
    Landed,
}

impl LanderState {
    /// States whose movement comes from steering and the integrator.
    pub fn is_airborne(self) -> bool {
        matches!(self, LanderState::Flying | LanderState::Landing)
    }

    /// States that hold a perch reservation.
    pub fn holds_perch(self) -> bool {
        matches!(self, LanderState::Docking | LanderState::Landed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lander {
    pub state: LanderState,
    pub energy: i32,
    /// Drain multiplier.
    pub metabolism: f32,
    /// Startle susceptibility in `[0, 1]`.
    pub personality: f32,
    pub target_position: Vec3,
    pub target_normal: Vec3,
    pub target_index: Option<usize>,
    pub flap: f32,
    pub fold: f32,
}

impl Lander {
    pub fn new(config: &LanderConfig, metabolism: f32, personality: f32) -> Self {
        Lander {
            state: LanderState::Flying,
            energy: config.max_energy,
            metabolism,
            personality,
            target_position: Vec3::ZERO,
            target_normal: Vec3::Y,
            target_index: None,
            flap: 1.0,
            fold: 0.0,
        }
    }

    /// Perch slot this agent currently holds, if any.
    pub fn held_perch(&self) -> Option<usize> {
        if self.state.holds_perch() {
            self.target_index
        } else {
            None
        }
    }

    fn clear_target(&mut self) {
        self.target_index = None;
        self.target_position = Vec3::ZERO;
        self.target_normal = Vec3::Y;
    }
}

/// Position, velocity and facing of one agent, copied out of the pool for
/// the duration of a transition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Kinematics {
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: Quat,
}

/// Cross-agent consequences of one transition.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LanderEffect {
    pub perch: Option<PerchUpdate>,
    /// `Some(false)` leaves the flocking pool, `Some(true)` rejoins it.
    pub flocking: Option<bool>,
}

impl LanderEffect {
    fn none() -> Self {
        Self::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StartleEvent {
    pub position: Vec3,
}

/// Double-buffered startle queue.
#[derive(Default)]
pub struct StartleBuffer {
    incoming: Mutex<Vec<StartleEvent>>,
    current: Vec<StartleEvent>,
}

impl StartleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for the next tick. Callable from parallel tasks.
    pub fn push(&self, event: StartleEvent) {
        self.incoming.lock().push(event);
    }

    /// Events raised during the previous tick.
    pub fn current(&self) -> &[StartleEvent] {
        &self.current
    }

    pub fn pending(&self) -> usize {
        self.incoming.lock().len()
    }

    /// End of tick: this tick's events become next tick's input.
    pub fn swap(&mut self) {
        self.current.clear();
        std::mem::swap(&mut self.current, self.incoming.get_mut());
    }
}

/// Read-only inputs shared by every transition in one pass.
pub struct LanderContext<'a> {
    pub config: &'a LanderConfig,
    pub tree: &'a PerchTree,
    pub startles: &'a StartleBuffer,
    pub dt: f32,
    pub seed: u64,
    pub tick: u64,
}

/// Per-agent generator, reproducible for a given seed, tick and id.
pub fn agent_rng(seed: u64, tick: u64, id: u32) -> SmallRng {
    let mixed = seed
        ^ tick.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ u64::from(id).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    SmallRng::seed_from_u64(mixed)
}

/// Run the transition for the agent's current state.
pub fn step(
    lander: &mut Lander,
    body: &mut Kinematics,
    id: u32,
    ctx: &LanderContext<'_>,
) -> LanderEffect {
    match lander.state {
        LanderState::Flying => fly(lander, body, ctx),
        LanderState::Landing => approach(lander, body, ctx),
        LanderState::Docking => dock(lander, body, ctx),
        LanderState::Landed => rest(lander, body, id, ctx),
    }
}

fn fly(lander: &mut Lander, body: &Kinematics, ctx: &LanderContext<'_>) -> LanderEffect {
    let cfg = ctx.config;
    lander.flap = 1.0;
    lander.fold = 0.0;

    let drain = (cfg.drain_rate * lander.metabolism * ctx.dt).ceil() as i32;
    lander.energy = (lander.energy - drain).max(0);
    if lander.energy > 0 {
        return LanderEffect::none();
    }

    match ctx.tree.nearest_unoccupied(body.position) {
        None => {
            lander.energy = cfg.energy_fraction(cfg.refund_fraction);
        }
        Some(hit) => {
            lander.target_position = hit.point.position + hit.point.normal * cfg.perch_offset;
            lander.target_normal = hit.point.normal;
            lander.target_index = Some(hit.index);
            lander.state = LanderState::Landing;
        }
    }
    LanderEffect::none()
}

fn approach(lander: &mut Lander, body: &mut Kinematics, ctx: &LanderContext<'_>) -> LanderEffect {
    let cfg = ctx.config;
    let Some(index) = lander.target_index else {
        // Landing without a target can only come from a hand-edited record.
        lander.state = LanderState::Flying;
        return LanderEffect::none();
    };

    if ctx.tree.occupancy()[index] > 0 {
        lander.energy = cfg.energy_fraction(cfg.abort_bonus);
        lander.clear_target();
        lander.state = LanderState::Flying;
        return LanderEffect::none();
    }

    if body.position.distance(lander.target_position) < cfg.docking_distance {
        body.velocity = Vec3::ZERO;
        lander.state = LanderState::Docking;
        return LanderEffect {
            perch: Some(PerchUpdate::Occupy(index)),
            flocking: Some(false),
        };
    }
    LanderEffect::none()
}

/// Rest pose: +Y along the surface normal, forward projected onto the
/// tangent plane.
fn perch_pose(rotation: Quat, normal: Vec3) -> Quat {
    let normal = safe_normalize(normal);
    let forward = rotation * Vec3::Z;
    let mut tangent = safe_normalize(forward - normal * forward.dot(normal));
    if tangent == Vec3::ZERO {
        tangent = normal.any_orthonormal_vector();
    }
    look_rotation(tangent, normal)
}

fn dock(lander: &mut Lander, body: &mut Kinematics, ctx: &LanderContext<'_>) -> LanderEffect {
    let cfg = ctx.config;
    let pose = perch_pose(body.rotation, lander.target_normal);
    let blend = exp_blend(cfg.dock_lerp_rate, ctx.dt);

    body.velocity = Vec3::ZERO;
    body.position = body.position.lerp(lander.target_position, blend);
    body.rotation = body.rotation.slerp(pose, blend).normalize();

    let distance = body.position.distance(lander.target_position);
    if distance > cfg.flap_switch_distance {
        lander.flap = 1.0;
    } else {
        lander.fold += (1.0 - lander.fold) * exp_blend(cfg.fold_rate, ctx.dt);
        lander.flap = 1.0 - lander.fold;
    }

    if distance < cfg.dock_snap_distance && lander.fold > cfg.fold_complete {
        body.position = lander.target_position;
        body.rotation = pose;
        lander.fold = 1.0;
        lander.flap = 0.0;
        lander.state = LanderState::Landed;
    }
    LanderEffect::none()
}

fn rest(
    lander: &mut Lander,
    body: &mut Kinematics,
    id: u32,
    ctx: &LanderContext<'_>,
) -> LanderEffect {
    let cfg = ctx.config;
    let radius_sq = cfg.startle_radius * cfg.startle_radius;
    let mut rng: Option<SmallRng> = None;

    for event in ctx.startles.current() {
        if event.position.distance_squared(body.position) > radius_sq {
            continue;
        }
        let rng = rng.get_or_insert_with(|| agent_rng(ctx.seed, ctx.tick, id));
        if rng.gen::<f32>() < lander.personality * cfg.startle_multiplier {
            lander.energy = cfg.max_energy - 1;
            break;
        }
    }

    let recover = (cfg.recover_rate * ctx.dt).ceil() as i32;
    lander.energy = (lander.energy + recover).min(cfg.max_energy);
    if lander.energy < cfg.max_energy {
        return LanderEffect::none();
    }

    // ── Takeoff ──────────────────────────────────────────────────────────
    let mut rng = rng.unwrap_or_else(|| agent_rng(ctx.seed, ctx.tick, id));
    let jitter = Vec3::from_array(UnitSphere.sample(&mut rng)) * TAKEOFF_JITTER;
    let heading = body.rotation * Vec3::Z;
    let launch = lander.target_normal * cfg.normal_bias + heading * (1.0 - cfg.normal_bias) + jitter;
    let mut direction = safe_normalize(launch);
    if direction == Vec3::ZERO {
        direction = safe_normalize(lander.target_normal);
    }

    body.velocity = direction * cfg.takeoff_speed;
    body.rotation = facing(body.velocity);
    ctx.startles.push(StartleEvent {
        position: body.position,
    });

    let freed = lander.target_index.map(PerchUpdate::Free);
    lander.clear_target();
    lander.state = LanderState::Flying;
    lander.flap = 1.0;
    lander.fold = 0.0;

    LanderEffect {
        perch: freed,
        flocking: Some(true),
    }
}

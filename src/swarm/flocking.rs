use super::avoidance::AvoidanceDirections;
use super::boundary::Boundary;
use super::flowfield::FlowField;
use super::lander::{Lander, LanderState};
use super::math::{clamp_speed, safe_normalize, steer_towards, EPSILON};
use super::pool::BoidPool;
use super::spatial::{AgentRecord, SpatialIndex};
use crate::core::config::FlockConfig;
use glam::{Quat, Vec3};
use rayon::prelude::*;

/// Speed multiple above which an agent tumbles instead of steering.
pub const TUMBLE_FACTOR: f32 = 1.2;
const BOUNDARY_FORCE_SCALE: f32 = 10.0;
const FLOW_FORCE_SCALE: f32 = 5.0;
const LANDING_MIN_FACTOR: f32 = 0.2;

/// Read-only view of everything one steering pass consumes.
/// Built once per tick; shared by every rayon task.
pub struct FlockingKernel<'a> {
    pub config: &'a FlockConfig,
    pub boundary: &'a Boundary,
    pub flow: Option<&'a FlowField>,
    pub directions: &'a AvoidanceDirections,
    pub index: &'a SpatialIndex,
    pub dt: f32,
}

/// Neighborhood sums from the 27-cell scan.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Neighborhood {
    pub count: u32,
    pub position_sum: Vec3,
    pub velocity_sum: Vec3,
    pub separation: Vec3,
}

impl<'a> FlockingKernel<'a> {
    pub fn neighborhood(&self, agent: &AgentRecord) -> Neighborhood {
        let view_sq = self.config.view_radius * self.config.view_radius;
        let sep_sq = self.config.separation_radius * self.config.separation_radius;
        let mut n = Neighborhood::default();

        self.index.for_each_neighbor(agent.position, |other| {
            if other.id == agent.id {
                return;
            }
            let offset = agent.position - other.position;
            let dist_sq = offset.length_squared();
            if dist_sq >= view_sq {
                return;
            }
            n.count += 1;
            n.position_sum += other.position;
            n.velocity_sum += other.velocity;
            if dist_sq > EPSILON * EPSILON && dist_sq < sep_sq {
                n.separation += offset / dist_sq.sqrt();
            }
        });
        n
    }

    /// New velocity for one agent. `rotation`, `avoidance` and `lander` come
    /// from the agent's pool slot.
    pub fn steer(
        &self,
        agent: &AgentRecord,
        rotation: Quat,
        avoidance: Option<u32>,
        lander: &Lander,
    ) -> Vec3 {
        let cfg = self.config;
        let v = agent.velocity;
        let max_force = cfg.max_steer_force;

        // Tumble: no steering until drag brings the speed back down
        let speed = v.length();
        if speed > cfg.max_speed * TUMBLE_FACTOR {
            let target = (v / speed) * cfg.max_speed;
            return v + (target - v) * (2.0 * self.dt).min(1.0);
        }

        let mut acceleration = Vec3::ZERO;

        let n = self.neighborhood(agent);
        if n.count > 0 {
            let inv = 1.0 / n.count as f32;
            let to_center = n.position_sum * inv - agent.position;
            let heading = n.velocity_sum * inv;
            acceleration += steer_towards(to_center, v, cfg.max_speed, max_force) * cfg.cohesion_weight;
            acceleration += steer_towards(heading, v, cfg.max_speed, max_force) * cfg.alignment_weight;
            acceleration +=
                steer_towards(n.separation, v, cfg.max_speed, max_force) * cfg.separation_weight;
        }

        let push = safe_normalize(self.boundary.wall_push(agent.position));
        if push != Vec3::ZERO {
            acceleration += steer_towards(push, v, cfg.max_speed, max_force * BOUNDARY_FORCE_SCALE)
                * cfg.boundary_weight;
        }

        if let Some(field) = self.flow {
            let flow = field.sample(agent.position);
            if flow != Vec3::ZERO {
                acceleration += steer_towards(flow, v, cfg.max_speed, max_force * FLOW_FORCE_SCALE)
                    * cfg.flowmap_weight;
            }
        }

        if let Some(dir) = avoidance.and_then(|i| self.directions.world(i, rotation)) {
            acceleration += steer_towards(dir, v, cfg.max_speed, max_force) * cfg.avoidance_weight;
        }

        if lander.state == LanderState::Landing {
            let to_target = lander.target_position - agent.position;
            let d = to_target.length();
            let falloff = (1.0 - d / cfg.landing_radius).clamp(LANDING_MIN_FACTOR, 1.0);
            acceleration +=
                steer_towards(to_target, v, cfg.max_speed, max_force) * cfg.landing_weight * falloff;
        }

        clamp_speed(v + acceleration * self.dt, cfg.min_speed, cfg.max_speed)
    }
}

/// Steer every indexed agent in parallel. Results land in `scratch` first
/// and are copied into the pool only after the whole pass, so every agent
/// reads the same frame snapshot.
pub fn run_flocking_pass(
    pool: &mut BoidPool,
    records: &[AgentRecord],
    kernel: &FlockingKernel<'_>,
    scratch: &mut Vec<Vec3>,
) {
    {
        let rotation = &pool.rotation;
        let avoidance = &pool.avoidance;
        let lander = &pool.lander;
        records
            .par_iter()
            .map(|r| {
                let slot = r.slot as usize;
                kernel.steer(r, rotation[slot], avoidance[slot], &lander[slot])
            })
            .collect_into_vec(scratch);
    }

    for (record, &velocity) in records.iter().zip(scratch.iter()) {
        pool.velocity[record.slot as usize] = velocity;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::LanderConfig;
    use crate::swarm::grid::GridGeometry;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    struct World {
        config: FlockConfig,
        boundary: Boundary,
        directions: AvoidanceDirections,
        index: SpatialIndex,
    }

    impl World {
        fn new(records: &[AgentRecord]) -> Self {
            let config = FlockConfig::default();
            let boundary = Boundary::default();
            let mut index = SpatialIndex::default();
            index.rebuild(GridGeometry::from_boundary(&boundary, config.view_radius), records);
            World {
                config,
                boundary,
                directions: AvoidanceDirections::default(),
                index,
            }
        }

        fn kernel(&self) -> FlockingKernel<'_> {
            FlockingKernel {
                config: &self.config,
                boundary: &self.boundary,
                flow: None,
                directions: &self.directions,
                index: &self.index,
                dt: 1.0 / 60.0,
            }
        }
    }

    fn record(id: u32, position: Vec3, velocity: Vec3) -> AgentRecord {
        AgentRecord {
            id,
            slot: id,
            position,
            velocity,
        }
    }

    fn flyer() -> Lander {
        Lander::new(&LanderConfig::default(), 1.0, 0.5)
    }

    #[test]
    fn lone_agent_keeps_velocity() {
        let a = record(0, Vec3::ZERO, Vec3::X * 3.0);
        let world = World::new(&[a]);
        let v = world.kernel().steer(&a, Quat::IDENTITY, None, &flyer());
        assert!((v - a.velocity).length() < 1e-6);
    }

    #[test]
    fn neighborhood_excludes_self_and_far_agents() {
        let records = [
            record(0, Vec3::ZERO, Vec3::X),
            record(1, Vec3::new(0.5, 0.0, 0.0), Vec3::Y),
            record(2, Vec3::new(2.0, 0.0, 0.0), Vec3::Z),
            record(3, Vec3::new(3.0, 0.0, 0.0), Vec3::Z),
        ];
        let world = World::new(&records);
        let n = world.kernel().neighborhood(&records[0]);
        // Agent 3 sits exactly on the view radius and is excluded.
        assert_eq!(n.count, 2);
        assert_eq!(n.velocity_sum, Vec3::Y + Vec3::Z);
        // Only agent 1 falls inside the separation radius.
        assert!((n.separation - Vec3::NEG_X).length() < 1e-6);
    }

    #[test]
    fn coincident_agents_add_no_separation() {
        let records = [
            record(0, Vec3::ZERO, Vec3::X),
            record(1, Vec3::ZERO, Vec3::X),
        ];
        let world = World::new(&records);
        let n = world.kernel().neighborhood(&records[0]);
        assert_eq!(n.count, 1);
        assert_eq!(n.separation, Vec3::ZERO);
    }

    /// Random but valid steering parameters.
    fn random_config(rng: &mut SmallRng) -> FlockConfig {
        let view_radius = rng.gen_range(1.5..6.0);
        let min_speed = rng.gen_range(0.0..4.0);
        FlockConfig {
            view_radius,
            separation_radius: view_radius * rng.gen_range(0.1..1.0),
            cohesion_weight: rng.gen_range(0.0..5.0),
            alignment_weight: rng.gen_range(0.0..5.0),
            separation_weight: rng.gen_range(0.0..5.0),
            avoidance_weight: rng.gen_range(0.0..5.0),
            boundary_weight: rng.gen_range(0.0..5.0),
            flowmap_weight: rng.gen_range(0.0..5.0),
            landing_weight: rng.gen_range(0.0..5.0),
            min_speed,
            max_speed: min_speed + rng.gen_range(0.5..10.0),
            max_steer_force: rng.gen_range(0.1..20.0),
            ..FlockConfig::default()
        }
    }

    #[test]
    fn steered_speed_stays_in_range_for_random_configs() {
        for seed in 0..24u64 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let cfg = random_config(&mut rng);
            assert!(cfg.validate().is_ok(), "seed {}: {:?}", seed, cfg);
            let boundary = Boundary::default();

            let mut pool = BoidPool::new();
            pool.spawn_random(400, &boundary, &cfg, &LanderConfig::default(), &mut rng)
                .unwrap();
            // Some agents well past the walls, some on a landing approach,
            // some with an obstacle ahead.
            for slot in (0..pool.len()).step_by(5) {
                pool.position[slot] *= rng.gen_range(0.5f32..1.4);
            }
            for slot in (0..pool.len()).step_by(7) {
                pool.lander[slot].state = LanderState::Landing;
                pool.lander[slot].target_position = Vec3::new(
                    rng.gen_range(-40.0..40.0),
                    -40.0,
                    rng.gen_range(-40.0..40.0),
                );
            }
            let directions = AvoidanceDirections::default();
            for slot in (0..pool.len()).step_by(3) {
                pool.avoidance[slot] = Some(rng.gen_range(0..directions.len() as u32));
            }

            let field = FlowField::uniform(
                Vec3::splat(-60.0),
                10.0,
                glam::UVec3::splat(13),
                rng.gen_range(0.1..3.0),
                Vec3::new(1.0, 0.5, -0.25),
            )
            .unwrap();

            let mut records = Vec::new();
            pool.fill_flocking_records(&mut records);
            let mut index = SpatialIndex::default();
            index.rebuild(GridGeometry::from_boundary(&boundary, cfg.view_radius), &records);
            let kernel = FlockingKernel {
                config: &cfg,
                boundary: &boundary,
                flow: Some(&field),
                directions: &directions,
                index: &index,
                dt: rng.gen_range(0.005..0.05),
            };

            let tolerance = 1e-4 * cfg.max_speed.max(1.0);
            for r in &records {
                let slot = r.slot as usize;
                let v = kernel.steer(r, pool.rotation[slot], pool.avoidance[slot], &pool.lander[slot]);
                let speed = v.length();
                assert!(
                    speed >= cfg.min_speed - tolerance && speed <= cfg.max_speed + tolerance,
                    "seed {}: agent {} speed {} outside [{}, {}]",
                    seed,
                    r.id,
                    speed,
                    cfg.min_speed,
                    cfg.max_speed
                );
            }
        }
    }

    #[test]
    fn tumbling_agent_only_damps() {
        let a = record(0, Vec3::ZERO, Vec3::X * 10.0);
        let b = record(1, Vec3::new(0.3, 0.0, 0.0), Vec3::Y);
        let world = World::new(&[a, b]);
        let v = world.kernel().steer(&a, Quat::IDENTITY, Some(0), &flyer());
        assert_eq!(v.y, 0.0);
        assert_eq!(v.z, 0.0);
        assert!(v.x < 10.0 && v.x > 5.0);
    }

    #[test]
    fn margin_zone_turns_agent_inward() {
        let a = record(0, Vec3::new(45.0, 0.0, 0.0), Vec3::X * 4.0);
        let world = World::new(&[a]);
        let v = world.kernel().steer(&a, Quat::IDENTITY, None, &flyer());
        assert!(v.x < a.velocity.x);
    }

    #[test]
    fn avoidance_direction_is_rotated_into_agent_frame() {
        let a = record(0, Vec3::ZERO, Vec3::Z * 3.0);
        let world = World::new(&[a]);
        let kernel = world.kernel();
        let local = world.directions.local(5).unwrap();
        let rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let v = kernel.steer(&a, rotation, Some(5), &flyer());
        let delta = v - a.velocity;
        assert!(delta.dot(rotation * local) > 0.0);
    }

    #[test]
    fn landing_agent_is_pulled_to_target() {
        let a = record(0, Vec3::ZERO, Vec3::X * 3.0);
        let world = World::new(&[a]);
        let mut lander = flyer();
        lander.state = LanderState::Landing;
        lander.target_position = Vec3::new(0.0, 4.0, 0.0);
        let v = world.kernel().steer(&a, Quat::IDENTITY, None, &lander);
        assert!(v.y > 0.0);
    }

    #[test]
    fn flow_field_bends_heading() {
        let a = record(0, Vec3::ZERO, Vec3::X * 3.0);
        let mut world = World::new(&[a]);
        world.config.flowmap_weight = 1.0;
        let field = FlowField::uniform(
            Vec3::splat(-10.0),
            5.0,
            glam::UVec3::splat(5),
            1.0,
            Vec3::Z,
        )
        .unwrap();
        let kernel = FlockingKernel {
            flow: Some(&field),
            ..world.kernel()
        };
        let v = kernel.steer(&a, Quat::IDENTITY, None, &flyer());
        assert!(v.z > 0.0);
    }

    #[test]
    fn pass_writes_back_after_whole_batch() {
        let mut pool = BoidPool::new();
        pool.spawn(Vec3::ZERO, Vec3::X * 3.0, flyer()).unwrap();
        pool.spawn(Vec3::new(1.0, 0.0, 0.0), Vec3::Y * 3.0, flyer()).unwrap();
        let mut records = Vec::new();
        pool.fill_flocking_records(&mut records);
        let world = World::new(&records);
        let kernel = world.kernel();

        let expected: Vec<Vec3> = records
            .iter()
            .map(|r| kernel.steer(r, pool.rotation[r.slot as usize], None, &flyer()))
            .collect();
        let mut scratch = Vec::new();
        run_flocking_pass(&mut pool, &records, &kernel, &mut scratch);
        assert_eq!(pool.velocity, expected);
    }
}

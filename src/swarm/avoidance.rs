//! Avoidance Directions
//!
//! Golden-spiral sample directions on the unit sphere, in agent-local space
//! (+Z = forward). Index 0 points straight ahead and indices sweep outward
//! toward the rear, which is the order an external raycast sweep tests them.

use glam::{Quat, Vec3};

const GOLDEN_RATIO: f32 = 1.618_034;

#[derive(Clone, Debug)]
pub struct AvoidanceDirections {
    directions: Vec<Vec3>,
}

impl AvoidanceDirections {
    pub fn fibonacci(count: usize) -> Self {
        let angle_increment = std::f32::consts::TAU * GOLDEN_RATIO;
        let directions = (0..count)
            .map(|i| {
                let t = i as f32 / count as f32;
                let inclination = (1.0 - 2.0 * t).acos();
                let azimuth = angle_increment * i as f32;
                Vec3::new(
                    inclination.sin() * azimuth.cos(),
                    inclination.sin() * azimuth.sin(),
                    inclination.cos(),
                )
            })
            .collect();
        Self { directions }
    }

    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    pub fn local(&self, index: u32) -> Option<Vec3> {
        self.directions.get(index as usize).copied()
    }

    /// Table direction rotated into the agent's world frame.
    pub fn world(&self, index: u32, rotation: Quat) -> Option<Vec3> {
        self.local(index).map(|d| rotation * d)
    }

    pub fn as_slice(&self) -> &[Vec3] {
        &self.directions
    }
}

impl Default for AvoidanceDirections {
    fn default() -> Self {
        Self::fibonacci(300)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_are_unit_and_start_forward() {
        let table = AvoidanceDirections::fibonacci(64);
        assert_eq!(table.len(), 64);
        assert!((table.local(0).unwrap() - Vec3::Z).length() < 1e-6);
        for d in table.as_slice() {
            assert!((d.length() - 1.0).abs() < 1e-4);
        }
        // Later samples drift toward the rear hemisphere.
        assert!(table.local(63).unwrap().z < -0.9);
    }

    #[test]
    fn world_rotation_follows_heading() {
        let table = AvoidanceDirections::fibonacci(16);
        let facing_x = Quat::from_rotation_arc(Vec3::Z, Vec3::X);
        let forward = table.world(0, facing_x).unwrap();
        assert!((forward - Vec3::X).length() < 1e-5);
        assert!(table.world(16, facing_x).is_none());
    }
}

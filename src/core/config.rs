use super::error::{ConfigError, RoostError};
use crate::swarm::boundary::Boundary;
use crate::swarm::grid::GridGeometry;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Flocking and steering parameters, read as a snapshot every tick.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlockConfig {
    /// Neighbor perception radius. Also the spatial grid cell size.
    pub view_radius: f32,
    pub separation_radius: f32,
    /// Raycast reach used by the external obstacle sweep.
    pub avoidance_radius: f32,
    /// Distance over which landing attraction ramps up.
    pub landing_radius: f32,

    pub cohesion_weight: f32,
    pub alignment_weight: f32,
    pub separation_weight: f32,
    pub avoidance_weight: f32,
    pub boundary_weight: f32,
    pub flowmap_weight: f32,
    pub landing_weight: f32,

    pub min_speed: f32,
    pub max_speed: f32,
    pub max_steer_force: f32,
}

impl Default for FlockConfig {
    fn default() -> Self {
        FlockConfig {
            view_radius: 3.0,
            separation_radius: 1.0,
            avoidance_radius: 5.0,
            landing_radius: 8.0,
            cohesion_weight: 1.0,
            alignment_weight: 1.0,
            separation_weight: 1.5,
            avoidance_weight: 4.0,
            boundary_weight: 2.0,
            flowmap_weight: 1.0,
            landing_weight: 3.0,
            min_speed: 2.0,
            max_speed: 5.0,
            max_steer_force: 3.0,
        }
    }
}

impl FlockConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("view_radius", self.view_radius)?;
        positive("separation_radius", self.separation_radius)?;
        positive("avoidance_radius", self.avoidance_radius)?;
        positive("landing_radius", self.landing_radius)?;
        positive("max_speed", self.max_speed)?;
        positive("max_steer_force", self.max_steer_force)?;
        if !(self.min_speed >= 0.0 && self.min_speed < self.max_speed) {
            return Err(ConfigError::SpeedRange {
                min: self.min_speed,
                max: self.max_speed,
            });
        }
        if self.separation_radius > self.view_radius {
            return Err(ConfigError::SeparationExceedsView {
                separation: self.separation_radius,
                view: self.view_radius,
            });
        }
        Ok(())
    }
}

/// Perch lifecycle parameters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LanderConfig {
    pub max_energy: i32,
    /// Energy spent per second of flight, before the metabolic multiplier.
    pub drain_rate: f32,
    /// Energy regained per second while landed.
    pub recover_rate: f32,
    /// Fraction of `max_energy` refunded when no perch is free.
    pub refund_fraction: f32,
    /// Fraction of `max_energy` granted when a target gets taken first.
    pub abort_bonus: f32,

    pub docking_distance: f32,
    /// Hover height above the surface along the perch normal.
    pub perch_offset: f32,
    pub dock_lerp_rate: f32,
    pub flap_switch_distance: f32,
    pub dock_snap_distance: f32,
    pub fold_rate: f32,
    pub fold_complete: f32,

    pub startle_radius: f32,
    pub startle_multiplier: f32,
    pub takeoff_speed: f32,
    /// Blend between the surface normal and the current heading on takeoff.
    pub normal_bias: f32,

    pub metabolism_min: f32,
    pub metabolism_max: f32,
}

impl Default for LanderConfig {
    fn default() -> Self {
        LanderConfig {
            max_energy: 10_000,
            drain_rate: 600.0,
            recover_rate: 1_500.0,
            refund_fraction: 0.25,
            abort_bonus: 0.1,
            docking_distance: 0.5,
            perch_offset: 0.05,
            dock_lerp_rate: 6.0,
            flap_switch_distance: 0.1,
            dock_snap_distance: 0.02,
            fold_rate: 4.0,
            fold_complete: 0.95,
            startle_radius: 4.0,
            startle_multiplier: 0.5,
            takeoff_speed: 3.0,
            normal_bias: 0.6,
            metabolism_min: 0.75,
            metabolism_max: 1.25,
        }
    }
}

impl LanderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_energy < 2 {
            return Err(ConfigError::MaxEnergy(self.max_energy));
        }
        positive("drain_rate", self.drain_rate)?;
        positive("recover_rate", self.recover_rate)?;
        positive("docking_distance", self.docking_distance)?;
        positive("dock_lerp_rate", self.dock_lerp_rate)?;
        positive("dock_snap_distance", self.dock_snap_distance)?;
        positive("fold_rate", self.fold_rate)?;
        positive("takeoff_speed", self.takeoff_speed)?;
        unit("refund_fraction", self.refund_fraction)?;
        unit("abort_bonus", self.abort_bonus)?;
        unit("fold_complete", self.fold_complete)?;
        unit("normal_bias", self.normal_bias)?;
        if !(self.metabolism_min > 0.0 && self.metabolism_min <= self.metabolism_max) {
            return Err(ConfigError::MetabolismRange {
                min: self.metabolism_min,
                max: self.metabolism_max,
            });
        }
        Ok(())
    }

    /// Energy value granted by a fraction of the maximum.
    pub fn energy_fraction(&self, fraction: f32) -> i32 {
        (self.max_energy as f32 * fraction).round() as i32
    }
}

/// Main parameters for a roost simulation
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub flock: FlockConfig,
    pub lander: LanderConfig,
    pub boundary: Boundary,
    pub seed: u64,
    /// Ticks between summary log lines. Zero disables them.
    pub log_every: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            flock: FlockConfig::default(),
            lander: LanderConfig::default(),
            boundary: Boundary::default(),
            seed: 0x5EED_B01D,
            log_every: 600,
        }
    }
}

impl SimConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.flock.validate()?;
        self.lander.validate()?;
        self.boundary.validate()?;
        GridGeometry::checked_from_boundary(&self.boundary, self.flock.view_radius)?;
        Ok(())
    }

    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, RoostError> {
        let cfg: SimConfig = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RoostError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let cfg = Self::from_json_str(&text)?;
        info!("[Config] Loaded {}", path.display());
        Ok(cfg)
    }
}

pub(crate) fn positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

fn unit(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfUnitRange { name, value })
    }
}

//! Error types
//!
//! Construction and configuration failures. Steady-state ticking never
//! returns errors: degenerate input yields sentinel or no-op results.

use thiserror::Error;

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("min_speed ({min}) must be below max_speed ({max})")]
    SpeedRange { min: f32, max: f32 },

    #[error("{name} must be finite and positive, got {value}")]
    NonPositive { name: &'static str, value: f32 },

    #[error("separation_radius ({separation}) exceeds view_radius ({view})")]
    SeparationExceedsView { separation: f32, view: f32 },

    #[error("{name} must lie in [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f32 },

    #[error("max_energy must be at least 2, got {0}")]
    MaxEnergy(i32),

    #[error("metabolism range [{min}, {max}] is empty or non-positive")]
    MetabolismRange { min: f32, max: f32 },

    #[error("view_radius {view_radius} splits the boundary into {cells} cells, more than a u32 index can address")]
    GridTooLarge { cells: u64, view_radius: f32 },
}

/// Top-level error for building a simulation.
#[derive(Debug, Error)]
pub enum RoostError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("flow field lattice holds {actual} vectors, dimensions require {expected}")]
    FlowFieldSize { expected: usize, actual: usize },

    #[error("flow field dimensions must be at least 2 on every axis, got {0:?}")]
    FlowFieldDims([u32; 3]),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("agent ids exhausted after {0} spawns")]
    IdsExhausted(u32),
}

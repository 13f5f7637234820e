//! RoostSwarm Core v0.4.0 - Parallel Flocking and Perching Engine
//!
//! This library provides the per-tick core of a large boid simulation: a
//! concurrent spatial hash for neighbor queries, the flocking steering pass
//! that consumes it, and a perch search tree driving each agent's landing
//! lifecycle.

pub mod core;
pub mod swarm;
pub mod utils;

// Re-export key types
pub use crate::core::config::{FlockConfig, LanderConfig, SimConfig};
pub use crate::core::error::{ConfigError, RoostError};
pub use crate::swarm::avoidance::AvoidanceDirections;
pub use crate::swarm::boundary::Boundary;
pub use crate::swarm::flowfield::FlowField;
pub use crate::swarm::grid::GridGeometry;
pub use crate::swarm::lander::{Lander, LanderState};
pub use crate::swarm::master_pipeline::{RoostSimulation, TickStats};
pub use crate::swarm::perch::{PerchHit, PerchPoint, PerchTree, PerchUpdate};
pub use crate::swarm::pool::BoidPool;
pub use crate::swarm::spatial::{AgentRecord, SpatialIndex};

/// Initialize tracing for the library.
///
/// `level` is an env-filter directive such as `"info"` or
/// `"roostswarm_core=debug"`. Calling it again after a subscriber is
/// installed does nothing.
pub fn setup_logging(level: Option<&str>) {
    let filter = level.unwrap_or("info");
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

//! Swarm Engine
//!
//! Per-tick flock simulation over struct-of-arrays agent storage.
//! Spatial hashing and steering run as bulk rayon passes; perch bookkeeping
//! is deferred and applied on one thread.

pub mod avoidance;
pub mod boundary;
pub mod flocking;
pub mod flowfield;
pub mod grid;
pub mod lander;
pub mod master_pipeline;
pub mod math;
pub mod perch;
pub mod pool;
pub mod spatial;


pub use master_pipeline::{RoostSimulation, TickStats};
pub use perch::PerchTree;
pub use spatial::SpatialIndex;

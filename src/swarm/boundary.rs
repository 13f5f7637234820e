//! World Boundary
//!
//! Axis-aligned box with independent positive/negative margins per axis.
//! The box faces are the hard wall; the margins define the soft zone where
//! agents start turning back.

use crate::core::config::positive;
use crate::core::error::ConfigError;
use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Boundary {
    pub center: Vec3,
    pub size: Vec3,
    /// Margin measured inward from the `+axis` face.
    pub margin_positive: Vec3,
    /// Margin measured inward from the `-axis` face.
    pub margin_negative: Vec3,
}

impl Default for Boundary {
    fn default() -> Self {
        Boundary {
            center: Vec3::ZERO,
            size: Vec3::splat(100.0),
            margin_positive: Vec3::splat(10.0),
            margin_negative: Vec3::splat(10.0),
        }
    }
}

impl Boundary {
    pub fn new(center: Vec3, size: Vec3, margin: Vec3) -> Self {
        Boundary {
            center,
            size,
            margin_positive: margin,
            margin_negative: margin,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("boundary.size.x", self.size.x)?;
        positive("boundary.size.y", self.size.y)?;
        positive("boundary.size.z", self.size.z)?;
        Ok(())
    }

    #[inline]
    pub fn min(&self) -> Vec3 {
        self.center - self.size * 0.5
    }

    #[inline]
    pub fn max(&self) -> Vec3 {
        self.center + self.size * 0.5
    }

    /// Largest margin on any axis or side.
    pub fn max_margin(&self) -> f32 {
        self.margin_positive.max_element().max(self.margin_negative.max_element())
    }

    /// Unit-per-axis push away from every wall whose margin zone contains
    /// `pos`. Zero when the point sits in the calm interior.
    pub fn wall_push(&self, pos: Vec3) -> Vec3 {
        let hi = self.max() - self.margin_positive;
        let lo = self.min() + self.margin_negative;
        let mut push = Vec3::ZERO;
        for axis in 0..3 {
            if pos[axis] > hi[axis] {
                push[axis] = -1.0;
            } else if pos[axis] < lo[axis] {
                push[axis] = 1.0;
            }
        }
        push
    }

    /// Interior box that keeps clear of every margin, clamped so it never
    /// inverts when margins exceed half the size.
    pub fn inner_bounds(&self) -> (Vec3, Vec3) {
        let lo = self.min() + self.margin_negative;
        let hi = self.max() - self.margin_positive;
        let mid = (lo + hi) * 0.5;
        (lo.min(mid), hi.max(mid))
    }
}

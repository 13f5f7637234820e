//! Perch Search Tree
//!
//! Static 3-d tree over perch candidate points, stored as an implicit binary
//! tree in a flat array (children of slot `i` at `2i+1` and `2i+2`). Only the
//! occupancy counters change after construction.
//!
//! Padding slots carry a sentinel position and occupancy `-1`, so they are
//! permanently "taken" and never returned by a query.

use glam::Vec3;
use tracing::{debug, info};

/// Occupancy value of a padding slot.
pub const SENTINEL_OCCUPANCY: i32 = -1;
const SENTINEL_POSITION: Vec3 = Vec3::splat(f32::MAX);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerchPoint {
    pub position: Vec3,
    pub normal: Vec3,
}

impl PerchPoint {
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self { position, normal }
    }

    fn sentinel() -> Self {
        Self {
            position: SENTINEL_POSITION,
            normal: Vec3::Y,
        }
    }
}

/// Result of a nearest-point query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerchHit {
    pub index: usize,
    pub point: PerchPoint,
    pub distance_sq: f32,
}

/// Deferred occupancy change, recorded inside a parallel pass and applied
/// afterwards on one thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PerchUpdate {
    Occupy(usize),
    Free(usize),
}

pub struct PerchTree {
    nodes: Vec<PerchPoint>,
    occupancy: Vec<i32>,
    point_count: usize,
}

impl PerchTree {
    /// Build from deduplicated candidate points.
    pub fn build(mut points: Vec<PerchPoint>) -> Self {
        let point_count = points.len();
        let len = (point_count + 1).next_power_of_two();
        let mut nodes = vec![PerchPoint::sentinel(); len];
        let mut occupancy = vec![SENTINEL_OCCUPANCY; len];

        place(&mut nodes, &mut occupancy, &mut points, 0, 0);

        info!(
            "[PerchTree] Built over {} points ({} slots)",
            point_count, len
        );
        PerchTree {
            nodes,
            occupancy,
            point_count,
        }
    }

    /// Number of real perch points.
    pub fn len(&self) -> usize {
        self.point_count
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    /// Array length including padding.
    pub fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn point(&self, index: usize) -> PerchPoint {
        self.nodes[index]
    }

    pub fn occupancy(&self) -> &[i32] {
        &self.occupancy
    }

    #[inline]
    pub fn is_free(&self, index: usize) -> bool {
        self.occupancy[index] == 0
    }

    pub fn occupy(&mut self, index: usize) {
        let slot = &mut self.occupancy[index];
        if *slot != SENTINEL_OCCUPANCY {
            *slot += 1;
        }
    }

    pub fn free(&mut self, index: usize) {
        let slot = &mut self.occupancy[index];
        if *slot > 0 {
            *slot -= 1;
        }
    }

    /// Apply a batch of deferred updates in order.
    pub fn apply(&mut self, updates: impl IntoIterator<Item = PerchUpdate>) {
        let mut applied = 0usize;
        for update in updates {
            match update {
                PerchUpdate::Occupy(i) => self.occupy(i),
                PerchUpdate::Free(i) => self.free(i),
            }
            applied += 1;
        }
        if applied > 0 {
            debug!("[PerchTree] Applied {} occupancy updates", applied);
        }
    }

    /// Occupied real points, for debug visualization.
    pub fn occupied_points(&self) -> impl Iterator<Item = (usize, &PerchPoint, i32)> + '_ {
        self.nodes
            .iter()
            .zip(self.occupancy.iter())
            .enumerate()
            .filter(|(_, (_, &occ))| occ > 0)
            .map(|(i, (p, &occ))| (i, p, occ))
    }

    /// Nearest point whose occupancy is exactly zero.
    pub fn nearest_unoccupied(&self, query: Vec3) -> Option<PerchHit> {
        let mut best = None;
        let mut best_dist_sq = f32::INFINITY;
        self.search(0, 0, query, true, &mut best, &mut best_dist_sq);
        best.map(|index| PerchHit {
            index,
            point: self.nodes[index],
            distance_sq: best_dist_sq,
        })
    }

    /// Nearest real point regardless of occupancy.
    pub fn nearest(&self, query: Vec3) -> Option<PerchHit> {
        let mut best = None;
        let mut best_dist_sq = f32::INFINITY;
        self.search(0, 0, query, false, &mut best, &mut best_dist_sq);
        best.map(|index| PerchHit {
            index,
            point: self.nodes[index],
            distance_sq: best_dist_sq,
        })
    }

    fn search(
        &self,
        slot: usize,
        depth: usize,
        query: Vec3,
        unoccupied_only: bool,
        best: &mut Option<usize>,
        best_dist_sq: &mut f32,
    ) {
        if slot >= self.nodes.len() {
            return;
        }
        let node = self.nodes[slot].position;
        let occupancy = self.occupancy[slot];

        let dist_sq = node.distance_squared(query);
        let eligible = if unoccupied_only {
            occupancy == 0
        } else {
            occupancy != SENTINEL_OCCUPANCY
        };
        if eligible && dist_sq < *best_dist_sq {
            *best_dist_sq = dist_sq;
            *best = Some(slot);
        }

        let axis = depth % 3;
        let diff = query[axis] - node[axis];
        let (near, far) = if diff < 0.0 {
            (2 * slot + 1, 2 * slot + 2)
        } else {
            (2 * slot + 2, 2 * slot + 1)
        };

        self.search(near, depth + 1, query, unoccupied_only, best, best_dist_sq);
        if diff * diff < *best_dist_sq {
            self.search(far, depth + 1, query, unoccupied_only, best, best_dist_sq);
        }
    }
}

/// Median split on `depth % 3`; the median lands in `slot`, the halves
/// recurse into its children.
fn place(
    nodes: &mut [PerchPoint],
    occupancy: &mut [i32],
    points: &mut [PerchPoint],
    slot: usize,
    depth: usize,
) {
    if points.is_empty() {
        return;
    }
    debug_assert!(slot < nodes.len(), "tree slot {} out of bounds", slot);

    let axis = depth % 3;
    let mid = points.len() / 2;
    points.select_nth_unstable_by(mid, |a, b| a.position[axis].total_cmp(&b.position[axis]));

    nodes[slot] = points[mid];
    occupancy[slot] = 0;

    let (left, rest) = points.split_at_mut(mid);
    let right = &mut rest[1..];
    place(nodes, occupancy, left, 2 * slot + 1, depth + 1);
    place(nodes, occupancy, right, 2 * slot + 2, depth + 1);
}

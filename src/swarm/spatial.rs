//! Spatial Index
//!
//! Per-tick concurrent multi-map from grid cell to the agents inside it,
//! plus a cluster map (cell → agent count) and the compacted list of
//! occupied cells. Storage is owned for the simulation's lifetime and only
//! ever grows. Bucket vectors are cleared in place between ticks, so a cell
//! that stays occupied reuses its allocation.

use super::grid::GridGeometry;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use glam::Vec3;
use rayon::prelude::*;
use tracing::debug;

/// Frame snapshot of one agent, as stored in a cell bucket.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentRecord {
    pub id: u32,
    /// Index into the pool columns.
    pub slot: u32,
    pub position: Vec3,
    pub velocity: Vec3,
}

pub struct SpatialIndex {
    grid: GridGeometry,
    /// cell → records
    buckets: DashMap<u32, Vec<AgentRecord>>,
    /// cell → agent count. Doubles as the "seen" set during pass 1.
    clusters: DashMap<u32, u32>,
    active_cells: Vec<u32>,
    capacity: usize,
    agent_count: usize,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl SpatialIndex {
    pub fn with_capacity(capacity: usize) -> Self {
        SpatialIndex {
            grid: GridGeometry::new(1.0, Vec3::ZERO, glam::UVec3::ONE),
            buckets: DashMap::with_capacity(capacity * 2),
            clusters: DashMap::with_capacity(capacity),
            active_cells: Vec::with_capacity(capacity),
            capacity,
            agent_count: 0,
        }
    }

    /// Make room for `required` agents. Reallocates at twice the requirement
    /// on overflow; otherwise clears and keeps the backing storage.
    fn prepare(&mut self, required: usize) {
        if required > self.capacity {
            let capacity = required * 2;
            debug!(
                "[SpatialIndex] Growing capacity {} -> {} agents",
                self.capacity, capacity
            );
            self.buckets = DashMap::with_capacity(capacity * 2);
            self.clusters = DashMap::with_capacity(capacity);
            self.active_cells = Vec::with_capacity(capacity);
            self.capacity = capacity;
        } else {
            self.recycle_buckets();
            self.clusters.clear();
            self.active_cells.clear();
        }
    }

    /// Empty every bucket without freeing it. Buckets already empty were
    /// unused for a whole tick and are dropped.
    fn recycle_buckets(&mut self) {
        self.buckets.retain(|_, bucket| {
            let used = !bucket.is_empty();
            bucket.clear();
            used
        });
    }

    /// Insert-if-absent on the cluster map. True only for the first caller
    /// per cell this tick.
    #[inline]
    pub fn claim_cell(&self, cell: u32) -> bool {
        claim(&self.clusters, cell)
    }

    /// Full rebuild for this tick. Both passes complete before returning.
    pub fn rebuild(&mut self, grid: GridGeometry, records: &[AgentRecord]) {
        self.prepare(records.len());
        self.grid = grid;
        self.agent_count = records.len();

        // ── Pass 1: bucket every agent, first writer registers the cell ──────
        let buckets = &self.buckets;
        let clusters = &self.clusters;
        self.active_cells
            .par_extend(records.par_iter().filter_map(|record| {
                let cell = grid.index_of(record.position);
                buckets.entry(cell).or_default().push(*record);
                claim(clusters, cell).then_some(cell)
            }));

        // ── Pass 2: count per active cell ────────────────────────────────────
        let buckets = &self.buckets;
        let clusters = &self.clusters;
        self.active_cells.par_iter().for_each(|&cell| {
            let count = buckets.get(&cell).map_or(0, |b| b.len() as u32);
            clusters.insert(cell, count);
        });
    }

    /// Forget the last tick's contents without touching capacity.
    pub fn clear(&mut self) {
        self.recycle_buckets();
        self.clusters.clear();
        self.active_cells.clear();
        self.agent_count = 0;
    }

    pub fn grid(&self) -> &GridGeometry {
        &self.grid
    }

    pub fn agent_count(&self) -> usize {
        self.agent_count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Occupied cells, each listed once, in no particular order.
    pub fn active_cells(&self) -> &[u32] {
        &self.active_cells
    }

    /// Agents bucketed in `cell` during the last rebuild.
    pub fn cluster_count(&self, cell: u32) -> u32 {
        self.clusters.get(&cell).map_or(0, |c| *c)
    }

    /// Agent count of the cell containing `pos`.
    pub fn density_at(&self, pos: Vec3) -> u32 {
        self.cluster_count(self.grid.index_of(pos))
    }

    #[inline]
    pub fn for_each_in_cell<F>(&self, cell: u32, mut f: F)
    where
        F: FnMut(&AgentRecord),
    {
        if let Some(bucket) = self.buckets.get(&cell) {
            bucket.iter().for_each(|r| f(r));
        }
    }

    /// Candidates from the 3×3×3 block around `pos`. A filter, not a
    /// guarantee: callers still check the exact distance.
    #[inline]
    pub fn for_each_neighbor<F>(&self, pos: Vec3, mut f: F)
    where
        F: FnMut(&AgentRecord),
    {
        let grid = self.grid;
        grid.for_each_block_cell(pos, |cell| self.for_each_in_cell(cell, &mut f));
    }
}

fn claim(clusters: &DashMap<u32, u32>, cell: u32) -> bool {
    match clusters.entry(cell) {
        Entry::Vacant(slot) => {
            slot.insert(0);
            true
        }
        Entry::Occupied(_) => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::boundary::Boundary;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn random_records(n: usize, half_extent: f32, seed: u64) -> Vec<AgentRecord> {
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..n)
            .map(|i| AgentRecord {
                id: i as u32,
                slot: i as u32,
                position: Vec3::new(
                    rng.gen_range(-half_extent..half_extent),
                    rng.gen_range(-half_extent..half_extent),
                    rng.gen_range(-half_extent..half_extent),
                ),
                velocity: Vec3::X,
            })
            .collect()
    }

    fn grid_for(half_extent: f32, radius: f32) -> GridGeometry {
        let boundary = Boundary::new(Vec3::ZERO, Vec3::splat(half_extent * 2.0), Vec3::ONE);
        GridGeometry::from_boundary(&boundary, radius)
    }

    #[test]
    fn active_cells_are_unique_and_counts_sum() {
        let records = random_records(2_000, 20.0, 3);
        let mut index = SpatialIndex::default();
        index.rebuild(grid_for(20.0, 3.0), &records);

        let mut cells = index.active_cells().to_vec();
        cells.sort_unstable();
        let before = cells.len();
        cells.dedup();
        assert_eq!(before, cells.len(), "duplicate active cell");

        let total: u32 = cells.iter().map(|&c| index.cluster_count(c)).sum();
        assert_eq!(total as usize, records.len());
    }

    #[test]
    fn neighbor_scan_matches_brute_force() {
        let radius = 3.0;
        for &(n, seed) in &[(10usize, 1u64), (300, 2), (2_500, 3)] {
            let records = random_records(n, 25.0, seed);
            let mut index = SpatialIndex::default();
            index.rebuild(grid_for(20.0, radius), &records);

            for a in records.iter().step_by((n / 50).max(1)) {
                let mut found: Vec<u32> = Vec::new();
                index.for_each_neighbor(a.position, |b| {
                    if b.id != a.id && a.position.distance_squared(b.position) < radius * radius {
                        found.push(b.id);
                    }
                });
                found.sort_unstable();

                let expected: Vec<u32> = records
                    .iter()
                    .filter(|b| {
                        b.id != a.id && a.position.distance_squared(b.position) < radius * radius
                    })
                    .map(|b| b.id)
                    .collect();
                assert_eq!(found, expected, "agent {} (n={})", a.id, n);
            }
        }
    }

    #[test]
    fn capacity_only_grows() {
        let mut index = SpatialIndex::default();
        index.rebuild(grid_for(10.0, 2.0), &random_records(100, 10.0, 4));
        assert_eq!(index.capacity(), 200);

        index.rebuild(grid_for(10.0, 2.0), &random_records(50, 10.0, 5));
        assert_eq!(index.capacity(), 200);
        assert_eq!(index.agent_count(), 50);

        index.rebuild(grid_for(10.0, 2.0), &random_records(500, 10.0, 6));
        assert_eq!(index.capacity(), 1_000);
    }

    #[test]
    fn empty_rebuild_leaves_no_cells() {
        let mut index = SpatialIndex::default();
        index.rebuild(grid_for(10.0, 2.0), &random_records(30, 10.0, 7));
        index.rebuild(grid_for(10.0, 2.0), &[]);
        assert!(index.active_cells().is_empty());
        assert_eq!(index.density_at(Vec3::ZERO), 0);

        index.rebuild(grid_for(10.0, 2.0), &random_records(30, 10.0, 8));
        index.clear();
        assert_eq!(index.agent_count(), 0);
        assert_eq!(index.capacity(), 60);
        assert!(index.active_cells().is_empty());
    }

    #[test]
    fn steady_rebuild_keeps_bucket_storage() {
        let records = random_records(400, 10.0, 9);
        let grid = grid_for(10.0, 2.0);
        let mut index = SpatialIndex::default();
        index.rebuild(grid, &records);

        let cell = grid.index_of(records[0].position);
        let before = index.buckets.get(&cell).map(|b| (b.as_ptr(), b.capacity()));
        index.rebuild(grid, &records);
        let after = index.buckets.get(&cell).map(|b| (b.as_ptr(), b.capacity()));
        assert!(before.is_some());
        assert_eq!(before, after);
        assert_eq!(index.cluster_count(cell), index.buckets.get(&cell).map_or(0, |b| b.len() as u32));
    }

    #[test]
    fn idle_buckets_are_dropped_after_one_tick() {
        let grid = grid_for(10.0, 2.0);
        let mut index = SpatialIndex::with_capacity(64);
        let far = AgentRecord {
            id: 0,
            slot: 0,
            position: Vec3::splat(8.0),
            velocity: Vec3::X,
        };
        let near = AgentRecord {
            position: Vec3::splat(-8.0),
            ..far
        };
        index.rebuild(grid, &[far]);
        index.rebuild(grid, &[near]);
        // Emptied in place, still present for one tick.
        assert!(index.buckets.contains_key(&grid.index_of(far.position)));
        assert_eq!(index.cluster_count(grid.index_of(far.position)), 0);

        index.rebuild(grid, &[near]);
        assert!(!index.buckets.contains_key(&grid.index_of(far.position)));
        assert_eq!(index.buckets.len(), 1);
    }

    #[test]
    fn claim_is_first_writer_wins() {
        let index = SpatialIndex::with_capacity(8);
        assert!(index.claim_cell(42));
        assert!(!index.claim_cell(42));
        assert!(index.claim_cell(43));
    }
}

// Uniform grid geometry.
//
// Cell size = view radius, so a neighbor query only needs the 3×3×3 block.
// Out-of-range coordinates clamp into the boundary cell: agents that drift
// past the nominal bounds are still bucketed, never dropped.

use super::boundary::Boundary;
use crate::core::error::ConfigError;
use glam::{IVec3, UVec3, Vec3};

/// Largest cell count whose flattened indices fit in a `u32` key.
pub const MAX_CELLS: u64 = u32::MAX as u64;

/// Cell layout for one tick. Immutable once built.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridGeometry {
    pub cell_size: f32,
    pub origin: Vec3,
    pub dims: UVec3,
}

impl GridGeometry {
    /// `dims` must multiply out to at most [`MAX_CELLS`].
    pub fn new(cell_size: f32, origin: Vec3, dims: UVec3) -> Self {
        assert!(cell_size > 0.0, "cell_size must be positive");
        GridGeometry {
            cell_size,
            origin,
            dims: dims.max(UVec3::ONE),
        }
    }

    /// Grid covering `boundary` with one cell of padding on every side.
    ///
    /// A configuration that would exceed [`MAX_CELLS`] gets its cell size
    /// doubled until it fits. Neighbor scans stay exact with the larger
    /// cells, only slower. Validated configurations never take that path.
    pub fn from_boundary(boundary: &Boundary, view_radius: f32) -> Self {
        let mut cell_size = view_radius;
        while cell_size > 0.0 && padded_cell_count(boundary, cell_size) > MAX_CELLS {
            cell_size *= 2.0;
        }
        Self::padded(boundary, cell_size)
    }

    /// Like [`from_boundary`](Self::from_boundary), but refuses oversized
    /// grids instead of coarsening them.
    pub fn checked_from_boundary(
        boundary: &Boundary,
        view_radius: f32,
    ) -> Result<Self, ConfigError> {
        let cells = padded_cell_count(boundary, view_radius);
        if cells > MAX_CELLS {
            return Err(ConfigError::GridTooLarge { cells, view_radius });
        }
        Ok(Self::padded(boundary, view_radius))
    }

    fn padded(boundary: &Boundary, cell_size: f32) -> Self {
        let origin = boundary.min() - Vec3::splat(cell_size);
        let [x, y, z] = padded_dims(boundary, cell_size);
        // Each axis fits: the product was checked against MAX_CELLS.
        Self::new(cell_size, origin, UVec3::new(x as u32, y as u32, z as u32))
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.dims.x as usize * self.dims.y as usize * self.dims.z as usize
    }

    /// Unclamped integer cell coordinates of `pos`.
    #[inline(always)]
    pub fn cell_coords(&self, pos: Vec3) -> IVec3 {
        let local = ((pos - self.origin) / self.cell_size).floor();
        // `as` saturates, so far-away or non-finite positions stay in range for the clamp.
        IVec3::new(local.x as i32, local.y as i32, local.z as i32)
    }

    #[inline(always)]
    pub fn clamp_coords(&self, coords: IVec3) -> UVec3 {
        let max = self.dims.as_ivec3() - IVec3::ONE;
        coords.clamp(IVec3::ZERO, max).as_uvec3()
    }

    /// Flattened index; coordinates are clamped into the grid first.
    #[inline(always)]
    pub fn cell_index(&self, coords: IVec3) -> u32 {
        let c = self.clamp_coords(coords).as_u64vec3();
        let dims = self.dims.as_u64vec3();
        (c.x + c.y * dims.x + c.z * dims.x * dims.y) as u32
    }

    #[inline(always)]
    pub fn index_of(&self, pos: Vec3) -> u32 {
        self.cell_index(self.cell_coords(pos))
    }

    /// Inverse of the flattening in [`cell_index`](Self::cell_index).
    #[inline]
    pub fn coords_from_index(&self, index: u32) -> UVec3 {
        let plane = self.dims.x * self.dims.y;
        let z = index / plane;
        let rem = index % plane;
        UVec3::new(rem % self.dims.x, rem / self.dims.x, z)
    }

    /// World-space center of a cell, for debug drawing.
    pub fn cell_center(&self, index: u32) -> Vec3 {
        let c = self.coords_from_index(index).as_vec3();
        self.origin + (c + Vec3::splat(0.5)) * self.cell_size
    }

    /// Calls `f` for each in-grid cell of the 3×3×3 block around `pos`.
    #[inline]
    pub fn for_each_block_cell<F>(&self, pos: Vec3, mut f: F)
    where
        F: FnMut(u32),
    {
        let center = self.clamp_coords(self.cell_coords(pos)).as_ivec3();
        let max = self.dims.as_ivec3();
        for dz in -1..=1 {
            let z = center.z + dz;
            if z < 0 || z >= max.z {
                continue;
            }
            for dy in -1..=1 {
                let y = center.y + dy;
                if y < 0 || y >= max.y {
                    continue;
                }
                for dx in -1..=1 {
                    let x = center.x + dx;
                    if x < 0 || x >= max.x {
                        continue;
                    }
                    f(self.cell_index(IVec3::new(x, y, z)));
                }
            }
        }
    }
}

/// Per-axis cell counts including padding, as `u64` so huge spans don't wrap.
fn padded_dims(boundary: &Boundary, cell_size: f32) -> [u64; 3] {
    let span = (boundary.size / cell_size).ceil();
    // `as` saturates for non-finite and out-of-range spans.
    [span.x, span.y, span.z].map(|s| (s as u32) as u64 + 2)
}

fn padded_cell_count(boundary: &Boundary, cell_size: f32) -> u64 {
    padded_dims(boundary, cell_size)
        .iter()
        .fold(1u64, |acc, &d| acc.saturating_mul(d))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

use crate::core::error::RoostError;
use glam::{UVec3, Vec3};

/// Static background vector field.
/// A 3D lattice of direction vectors sampled with trilinear interpolation;
/// agents steer along it as a gentle prevailing current.
#[derive(Clone, Debug)]
pub struct FlowField {
    pub origin: Vec3,
    pub cell_size: f32,
    pub dims: UVec3,
    pub strength: f32,
    vectors: Box<[Vec3]>,
}

impl FlowField {
    /// `vectors` is laid out `x + y*dx + z*dx*dy`.
    pub fn new(
        origin: Vec3,
        cell_size: f32,
        dims: UVec3,
        strength: f32,
        vectors: Vec<Vec3>,
    ) -> Result<Self, RoostError> {
        if dims.min_element() < 2 {
            return Err(RoostError::FlowFieldDims(dims.to_array()));
        }
        let expected = dims.x as usize * dims.y as usize * dims.z as usize;
        if vectors.len() != expected {
            return Err(RoostError::FlowFieldSize {
                expected,
                actual: vectors.len(),
            });
        }
        crate::core::config::positive("flow_field.cell_size", cell_size)?;
        Ok(Self {
            origin,
            cell_size,
            dims,
            strength,
            vectors: vectors.into_boxed_slice(),
        })
    }

    /// Field where every lattice point holds the same vector.
    pub fn uniform(
        origin: Vec3,
        cell_size: f32,
        dims: UVec3,
        strength: f32,
        direction: Vec3,
    ) -> Result<Self, RoostError> {
        let n = dims.x as usize * dims.y as usize * dims.z as usize;
        Self::new(origin, cell_size, dims, strength, vec![direction; n])
    }

    #[inline(always)]
    fn at(&self, x: u32, y: u32, z: u32) -> Vec3 {
        let idx = x as usize
            + y as usize * self.dims.x as usize
            + z as usize * self.dims.x as usize * self.dims.y as usize;
        self.vectors[idx]
    }

    /// Trilinear sample at a world position. Zero outside `[0, dim-1)`.
    pub fn sample(&self, pos: Vec3) -> Vec3 {
        let local = (pos - self.origin) / self.cell_size;
        let upper = (self.dims - UVec3::ONE).as_vec3();
        if !(local.cmpge(Vec3::ZERO).all() && local.cmplt(upper).all()) {
            return Vec3::ZERO;
        }

        let base = local.floor();
        let t = local - base;
        let (x, y, z) = (base.x as u32, base.y as u32, base.z as u32);

        // Blend along X, then Y, then Z
        let c00 = self.at(x, y, z).lerp(self.at(x + 1, y, z), t.x);
        let c10 = self.at(x, y + 1, z).lerp(self.at(x + 1, y + 1, z), t.x);
        let c01 = self.at(x, y, z + 1).lerp(self.at(x + 1, y, z + 1), t.x);
        let c11 = self.at(x, y + 1, z + 1).lerp(self.at(x + 1, y + 1, z + 1), t.x);

        let c0 = c00.lerp(c10, t.y);
        let c1 = c01.lerp(c11, t.y);

        c0.lerp(c1, t.z) * self.strength
    }
}

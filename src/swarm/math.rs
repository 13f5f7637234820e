use glam::{Quat, Vec3};

pub const EPSILON: f32 = 1.0e-6;

/// Unit vector, or zero when the input is too short to normalize.
#[inline(always)]
pub fn safe_normalize(v: Vec3) -> Vec3 {
    let len_sq = v.length_squared();
    if len_sq <= EPSILON * EPSILON || !len_sq.is_finite() {
        return Vec3::ZERO;
    }
    v * len_sq.sqrt().recip()
}

/// Velocity correction that turns `velocity` toward `desired` at full
/// speed, capped at `max_force`.
#[inline(always)]
pub fn steer_towards(desired: Vec3, velocity: Vec3, max_speed: f32, max_force: f32) -> Vec3 {
    let v = safe_normalize(desired) * max_speed - velocity;
    v.clamp_length_max(max_force)
}

/// Rescale `v` so its length falls in `[min, max]`. Direction is kept and
/// zero stays zero.
#[inline]
pub fn clamp_speed(v: Vec3, min: f32, max: f32) -> Vec3 {
    let speed = v.length();
    if speed <= EPSILON {
        return Vec3::ZERO;
    }
    let dir = v / speed;
    dir * speed.clamp(min, max)
}

/// Orientation with local +Z along `forward`; identity for a zero vector.
#[inline]
pub fn facing(forward: Vec3) -> Quat {
    let dir = safe_normalize(forward);
    if dir == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_arc(Vec3::Z, dir)
}

/// Orientation with local +Z along `forward` and local +Y as close to `up`
/// as the forward axis allows.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let f = safe_normalize(forward);
    let right = safe_normalize(up.cross(f));
    if f == Vec3::ZERO || right == Vec3::ZERO {
        return facing(forward);
    }
    let u = f.cross(right);
    Quat::from_mat3(&glam::Mat3::from_cols(right, u, f)).normalize()
}

/// Per-tick blend factor for an exponential approach at `rate` per second.
#[inline(always)]
pub fn exp_blend(rate: f32, dt: f32) -> f32 {
    1.0 - (-rate * dt).exp()
}

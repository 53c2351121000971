//! Analytic per-particle target generators.

use std::f32::consts::TAU;

use glam::Vec3;
use rand::Rng;

use super::GroupKind;
use crate::config::TreeOptions;

/// Point on a cone: height uniform, radius shrinking linearly to zero at the top.
pub fn tree_target<R: Rng + ?Sized>(kind: GroupKind, tree: &TreeOptions, rng: &mut R) -> Vec3 {
    let h = rng.random::<f32>() * tree.height;
    let y = h - tree.height / 2.0;
    let radius_ratio = match kind {
        // sqrt biases gold towards the trunk
        GroupKind::Gold => rng.random::<f32>().sqrt(),
        GroupKind::Red | GroupKind::Gift => 0.9 + rng.random::<f32>() * 0.1,
    };
    let max_r = (1.0 - h / tree.height) * tree.base_radius;
    let r = max_r * radius_ratio;
    let theta = rng.random::<f32>() * TAU;
    Vec3::new(r * theta.cos(), y, r * theta.sin())
}

/// Point inside the explosion sphere, uniform by volume.
pub fn explode_target<R: Rng + ?Sized>(kind: GroupKind, radius: f32, rng: &mut R) -> Vec3 {
    let mult = match kind {
        GroupKind::Gift => 1.2,
        GroupKind::Gold | GroupKind::Red => 1.0,
    };
    uniform_in_sphere(radius * mult, rng)
}

/// Filled parametric heart with per-axis noise.
pub fn heart_target<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    const SCALE: f32 = 2.2;
    const NOISE: f32 = 1.0;
    const DEPTH: f32 = 8.0;
    const LIFT: f32 = 5.0;

    let t = rng.random::<f32>() * TAU;
    let mut x = 16.0 * t.sin().powi(3);
    let mut y = 13.0 * t.cos() - 5.0 * (2.0 * t).cos() - 2.0 * (3.0 * t).cos() - (4.0 * t).cos();

    let fill = rng.random::<f32>().powf(0.3);
    x *= fill;
    y *= fill;
    let mut z = (rng.random::<f32>() - 0.5) * DEPTH * fill;

    x += (rng.random::<f32>() - 0.5) * NOISE;
    y += (rng.random::<f32>() - 0.5) * NOISE;
    z += (rng.random::<f32>() - 0.5) * NOISE;

    Vec3::new(x * SCALE, y * SCALE + LIFT, z)
}

/// Direction uniform on the sphere, distance `radius * cbrt(u)`.
pub fn uniform_in_sphere<R: Rng + ?Sized>(radius: f32, rng: &mut R) -> Vec3 {
    let u = rng.random::<f32>();
    let v = rng.random::<f32>();
    let phi = (2.0 * v - 1.0).clamp(-1.0, 1.0).acos();
    let lambda = TAU * u;
    let rad = radius * rng.random::<f32>().cbrt();
    Vec3::new(
        rad * phi.sin() * lambda.cos(),
        rad * phi.sin() * lambda.sin(),
        rad * phi.cos(),
    )
}

/// Scatter cloud used for gallery particles that are not revealed yet.
pub fn scatter_cloud<R: Rng + ?Sized>(count: usize, spread: f32, rng: &mut R) -> Vec<Vec3> {
    (0..count).map(|_| uniform_in_sphere(spread, rng)).collect()
}

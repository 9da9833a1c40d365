// Triangle animation
//
// Three points 120° apart on a circle of radius 0.5, rotated by the
// animation phase `cycle` in [0, 1).

use glam::Vec2;
use std::f32::consts::TAU;
use std::time::Duration;

/// Vertices drawn per frame
pub const VERTEX_COUNT: usize = 3;

pub type TriangleVertices = [Vec2; VERTEX_COUNT];

/// Clip-space positions of the triangle's corners for the given phase.
pub fn triangle_vertices(cycle: f32) -> TriangleVertices {
    let mod_cycle = -cycle - 0.5;
    let alpha = mod_cycle * TAU;
    let beta = (mod_cycle + 1.0 / 3.0) * TAU;
    let gamma = (mod_cycle + 2.0 / 3.0) * TAU;

    [alpha, beta, gamma].map(|theta| Vec2::new(theta.sin() / 2.0, theta.cos() / 2.0))
}

/// Animation phase in [0, 1) after `elapsed` time with one rotation per `period`.
pub fn cycle_at(elapsed: Duration, period: Duration) -> f32 {
    if period.is_zero() {
        return 0.0;
    }
    let cycle = (elapsed.as_secs_f64() / period.as_secs_f64()).fract() as f32;
    // 0.99999999 rounds up to 1.0 in f32
    if cycle >= 1.0 {
        0.0
    } else {
        cycle
    }
}

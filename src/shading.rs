//! Scalar shading helpers shared by the CPU evaluators.
//!
//! These mirror the WGSL built-ins used by `gpu/shader_pattern.wgsl` so the
//! CPU reference and the GPU program produce the same coverage.

use glam::Vec2;

/// Fallback anti-aliasing width (in the evaluated coordinate's units) used
/// when screen-space derivatives are unavailable.
pub const AA_FALLBACK_WIDTH: f32 = 1e-3;

/// Lower bound for any anti-aliasing width so `smoothstep` edges never meet.
pub const MIN_AA_WIDTH: f32 = 1e-6;

/// GLSL/WGSL `fract`: `x - floor(x)`, always in [0, 1) for finite input.
///
/// Differs from [`f32::fract`], which truncates towards zero.
pub fn fract(x: f32) -> f32 {
    x - x.floor()
}

pub fn fract2(v: Vec2) -> Vec2 {
    Vec2::new(fract(v.x), fract(v.y))
}

/// Hermite interpolation between `edge0` and `edge1`.
///
/// Callers keep `edge0 < edge1`; equal edges return a hard step.
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let span = edge1 - edge0;
    if span.abs() <= f32::EPSILON {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / span).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

pub fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Screen-space derivatives of the surface coordinate at a sample.
///
/// `dx` / `dy` are the change of the surface-local position between this
/// sample and its right / lower neighbour on screen. They are recomputed for
/// every frame and never cached.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Footprint {
    Derivatives { dx: Vec2, dy: Vec2 },
    /// Derivatives unavailable (e.g. a neighbour missed the surface).
    Unavailable,
}

impl Footprint {
    pub fn new(dx: Vec2, dy: Vec2) -> Self {
        if dx.is_finite() && dy.is_finite() {
            Footprint::Derivatives { dx, dy }
        } else {
            Footprint::Unavailable
        }
    }

    /// `fwidth` of a coordinate `q = p * gain + c`, per axis.
    pub fn fwidth(&self, gain: f32) -> Vec2 {
        match self {
            Footprint::Derivatives { dx, dy } => (dx.abs() + dy.abs()) * gain.abs(),
            Footprint::Unavailable => Vec2::splat(AA_FALLBACK_WIDTH),
        }
    }
}

/// Anti-aliased coverage of a line of `half_width` at `distance` from its
/// centre line.
///
/// Zero thickness gives exactly zero. Coverage is non-increasing in
/// `distance`, and for sub-pixel lines it fades in proportion to
/// `half_width / aa_width` instead of popping.
pub fn line_coverage(distance: f32, half_width: f32, aa_width: f32) -> f32 {
    if half_width <= 0.0 {
        return 0.0;
    }
    let w = aa_width.max(MIN_AA_WIDTH);
    let edge = 1.0 - smoothstep(half_width - w, half_width + w, distance);
    edge * (half_width / w).min(1.0)
}

/// Soft mask that is 1 well inside `extent` and exactly 0 at or beyond it.
pub fn inner_mask(distance: f32, extent: f32, aa_width: f32) -> f32 {
    if extent <= 0.0 {
        return 0.0;
    }
    let w = aa_width.max(MIN_AA_WIDTH);
    1.0 - smoothstep(extent - w, extent, distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fract_is_floor_based() {
        assert!((fract(1.25) - 0.25).abs() < 1e-6);
        assert!((fract(-0.25) - 0.75).abs() < 1e-6);
        assert_eq!(fract(3.0), 0.0);
    }

    #[test]
    fn test_smoothstep_endpoints() {
        assert_eq!(smoothstep(0.0, 1.0, -1.0), 0.0);
        assert_eq!(smoothstep(0.0, 1.0, 2.0), 1.0);
        assert!((smoothstep(0.0, 1.0, 0.5) - 0.5).abs() < 1e-6);
        assert_eq!(smoothstep(0.5, 0.5, 0.4), 0.0);
        assert_eq!(smoothstep(0.5, 0.5, 0.6), 1.0);
    }

    #[test]
    fn test_line_coverage_zero_thickness() {
        for d in [0.0, 0.001, 0.1, 0.5] {
            assert_eq!(line_coverage(d, 0.0, 0.01), 0.0);
        }
    }

    #[test]
    fn test_line_coverage_monotonic() {
        let mut last = line_coverage(0.0, 0.05, 0.01);
        assert!(last > 0.99);
        for i in 1..100 {
            let c = line_coverage(i as f32 * 0.002, 0.05, 0.01);
            assert!(c <= last + 1e-6);
            last = c;
        }
        assert_eq!(line_coverage(0.1, 0.05, 0.01), 0.0);
    }

    #[test]
    fn test_sub_pixel_line_fades() {
        let thin = line_coverage(0.0, 0.001, 0.01);
        let thick = line_coverage(0.0, 0.02, 0.01);
        assert!(thin > 0.0 && thin < 0.2);
        assert!(thick > 0.99);
    }

    #[test]
    fn test_inner_mask_is_zero_at_extent() {
        assert_eq!(inner_mask(0.2, 0.2, 0.05), 0.0);
        assert_eq!(inner_mask(0.3, 0.2, 0.05), 0.0);
        assert_eq!(inner_mask(0.1, 0.2, 0.05), 1.0);
        assert_eq!(inner_mask(0.0, 0.0, 0.05), 0.0);
    }

    #[test]
    fn test_footprint_fallback() {
        let fp = Footprint::new(Vec2::new(f32::NAN, 0.0), Vec2::ZERO);
        assert_eq!(fp, Footprint::Unavailable);
        assert_eq!(fp.fwidth(10.0), Vec2::splat(AA_FALLBACK_WIDTH));

        let fp = Footprint::new(Vec2::new(0.01, -0.02), Vec2::new(0.0, 0.01));
        let w = fp.fwidth(2.0);
        assert!((w.x - 0.02).abs() < 1e-6);
        assert!((w.y - 0.06).abs() < 1e-6);
    }
}

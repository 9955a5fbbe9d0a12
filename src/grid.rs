//! Analytic grid evaluator.
//!
//! Lines sit on the integer lattice of `q = p * scale - offset`, where `p`
//! is the surface-local coordinate (origin at the surface centre). The
//! anti-aliasing width is `fwidth(q)`, so lines stay one consistent width on
//! screen at any distance or viewing angle.

use glam::Vec2;

use crate::color::Rgb;
use crate::compositor::PatternSample;
use crate::params::{PatternParameters, SCALE_EPSILON};
use crate::shading::{fract2, line_coverage, Footprint};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridEvaluator {
    scale: f32,
    thickness: f32,
    offset: Vec2,
    color: Rgb,
}

impl GridEvaluator {
    pub fn new(params: &PatternParameters) -> Self {
        Self {
            scale: params.scale.max(SCALE_EPSILON),
            thickness: params.thickness.max(0.0),
            offset: params.offset,
            color: params.color,
        }
    }

    /// Scaled, phase-shifted coordinate.
    fn lattice(&self, p: Vec2) -> Vec2 {
        p * self.scale - self.offset
    }

    /// Per-axis distance to the nearest grid line, in cell units [0, 0.5].
    ///
    /// `c = fract(q)`, `d = |c - 0.5| - 0.5`; returns `|d|`.
    pub fn line_distance(&self, p: Vec2) -> Vec2 {
        let c = fract2(self.lattice(p));
        ((c - Vec2::splat(0.5)).abs() - Vec2::splat(0.5)).abs()
    }

    /// Line coverage in [0, 1]; a point is on the grid if it is near a line
    /// on either axis.
    pub fn coverage(&self, p: Vec2, footprint: &Footprint) -> f32 {
        let aa = footprint.fwidth(self.scale);
        let d = self.line_distance(p);
        line_coverage(d.x, self.thickness, aa.x).max(line_coverage(d.y, self.thickness, aa.y))
    }

    /// Overlay sample: grid colour with coverage as alpha.
    pub fn sample(&self, p: Vec2, footprint: &Footprint) -> PatternSample {
        PatternSample::new(self.color, self.coverage(p, footprint))
    }

    /// Surface-local positions of the lines crossing `[-half, half]` on one
    /// axis, in increasing order.
    pub fn line_positions(&self, half_extent: f32, axis_offset: f32) -> impl Iterator<Item = f32> {
        let scale = self.scale;
        let (first, last) = self.line_indices(half_extent, axis_offset);
        (first..=last).map(move |i| (i as f32 + axis_offset) / scale)
    }

    /// Number of lines [`GridEvaluator::line_positions`] yields, without
    /// walking them.
    pub fn line_count(&self, half_extent: f32, axis_offset: f32) -> u64 {
        let (first, last) = self.line_indices(half_extent, axis_offset);
        if last < first {
            0
        } else {
            last.abs_diff(first) + 1
        }
    }

    /// First and last lattice index inside `[-half, half]`.
    fn line_indices(&self, half_extent: f32, axis_offset: f32) -> (i64, i64) {
        let first = (-half_extent * self.scale - axis_offset).ceil() as i64;
        let last = (half_extent * self.scale - axis_offset).floor() as i64;
        (first, last)
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn offset(&self) -> Vec2 {
        self.offset
    }
}

//! Analytic cross evaluator.
//!
//! The surface is partitioned into `cells x cells` squares anchored at the
//! surface edge (`cells = floor(density)`), so a density of `n` always
//! yields `n x n` whole cells and a density of 1 puts one cross at the
//! centre. Each cell holds a bounded "+" made of two perpendicular arms
//! through its (phase-shifted) centre.
//!
//! Arm half-length and half-width are expressed in cell units and shrink as
//! density grows, through an inverse correction that is floored at
//! [`MIN_DENSITY_CORRECTION`] so it never vanishes.

use glam::{IVec2, Vec2};

use crate::color::Rgb;
use crate::compositor::PatternSample;
use crate::params::{density_cells, PatternParameters, MIN_DENSITY};
use crate::shading::{fract2, inner_mask, line_coverage, Footprint};

/// Maps the `scale` parameter to a half-size in cell units at low density.
pub const CROSS_SIZE_GAIN: f32 = 10.0;
/// Density below which the cross half-size is not corrected.
pub const SIZE_REFERENCE_DENSITY: f32 = 5.0;
/// Density below which the line half-width is not corrected.
pub const THICKNESS_REFERENCE_DENSITY: f32 = 3.0;
/// Floor of the density correction factor.
pub const MIN_DENSITY_CORRECTION: f32 = 0.5;
/// Neither arm length nor width may leave its cell.
pub const MAX_CELL_EXTENT: f32 = 0.5;

/// `reference / density`, clamped into `[MIN_DENSITY_CORRECTION, 1]`.
pub fn density_correction(reference: f32, density: f32) -> f32 {
    (reference / density.max(MIN_DENSITY)).clamp(MIN_DENSITY_CORRECTION, 1.0)
}

/// Arm half-length in cell units.
pub fn cross_half_size(scale: f32, density: f32) -> f32 {
    (scale.max(0.0) * CROSS_SIZE_GAIN * density_correction(SIZE_REFERENCE_DENSITY, density))
        .min(MAX_CELL_EXTENT)
}

/// Arm half-width in cell units.
pub fn cross_half_width(thickness: f32, density: f32) -> f32 {
    (thickness.max(0.0) * density_correction(THICKNESS_REFERENCE_DENSITY, density))
        .min(MAX_CELL_EXTENT)
}

/// Where a surface point falls in the cell partition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellPoint {
    pub index: IVec2,
    /// Offset from the cross centre in cell units, each axis in [-0.5, 0.5).
    pub local: Vec2,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CrossEvaluator {
    extent: f32,
    cells: u32,
    cell_size: f32,
    half_size: f32,
    half_width: f32,
    offset: Vec2,
    color: Rgb,
}

impl CrossEvaluator {
    /// `extent` is the side length of the square surface.
    pub fn new(params: &PatternParameters, extent: f32) -> Self {
        let extent = extent.max(f32::EPSILON);
        let cells = density_cells(params.density);
        Self {
            extent,
            cells,
            cell_size: extent / cells as f32,
            half_size: cross_half_size(params.scale, params.density),
            half_width: cross_half_width(params.thickness, params.density),
            offset: params.offset,
            color: params.color,
        }
    }

    pub fn cells(&self) -> u32 {
        self.cells
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Arm half-length (`k`) in cell units.
    pub fn half_size(&self) -> f32 {
        self.half_size
    }

    /// Arm half-width in cell units.
    pub fn half_width(&self) -> f32 {
        self.half_width
    }

    pub fn locate(&self, p: Vec2) -> CellPoint {
        let shifted = (p + Vec2::splat(self.extent * 0.5)) / self.cell_size + self.offset * 0.5;
        CellPoint {
            index: shifted.floor().as_ivec2(),
            local: fract2(shifted) - Vec2::splat(0.5),
        }
    }

    /// Surface-local position of the cross centre of a cell.
    pub fn cell_center(&self, index: IVec2) -> Vec2 {
        let local = index.as_vec2() + Vec2::splat(0.5) - self.offset * 0.5;
        local * self.cell_size - Vec2::splat(self.extent * 0.5)
    }

    /// Cross centres of every cell, row by row.
    pub fn centers(&self) -> impl Iterator<Item = Vec2> + '_ {
        let n = self.cells as i32;
        (0..n).flat_map(move |y| (0..n).map(move |x| self.cell_center(IVec2::new(x, y))))
    }

    pub fn coverage(&self, p: Vec2, footprint: &Footprint) -> f32 {
        let aa = footprint.fwidth(1.0 / self.cell_size);
        let a = self.locate(p).local.abs();
        let horizontal =
            line_coverage(a.y, self.half_width, aa.y) * inner_mask(a.x, self.half_size, aa.x);
        let vertical =
            line_coverage(a.x, self.half_width, aa.x) * inner_mask(a.y, self.half_size, aa.y);
        horizontal.max(vertical)
    }

    pub fn sample(&self, p: Vec2, footprint: &Footprint) -> PatternSample {
        PatternSample::new(self.color, self.coverage(p, footprint))
    }
}

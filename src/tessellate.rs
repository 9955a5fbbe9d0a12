//! CPU tessellation of patterns into line-list geometry.
//!
//! The line primitive has no width control, so a thick line is faked with a
//! bundle of parallel segments spread evenly across the line's width. The
//! bundle size depends on thickness alone, never on density, so the vertex
//! count grows monotonically with cell count. Every segment of every cross
//! (or grid line) is merged into one line-list buffer.
//!
//! Output is a pure function of the parameters: positions are computed from
//! integer cell indices in a fixed row-major order, so identical inputs give
//! byte-identical buffers.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::cross::{cross_half_size, cross_half_width};
use crate::error::PatternError;
use crate::gpu::mesh::LineVertex;
use crate::grid::GridEvaluator;
use crate::params::{density_cells, PatternParameters};

pub const DEFAULT_BUNDLE_STEP: f32 = 0.007;
pub const DEFAULT_MAX_BUNDLE_LINES: u32 = 8;
pub const DEFAULT_MAX_LINE_VERTICES: usize = 1 << 20;
pub const MAX_SUB_DENSITY: f32 = 64.0;
const MAX_BUNDLE_LINES_LIMIT: u32 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TessellationOptions {
    /// Desired crosses per cell; packed as `ceil(sqrt(sub_density))^2`.
    pub sub_density: f32,
    /// Thickness (cell units) drawn by each line of a bundle.
    pub bundle_step: f32,
    pub max_bundle_lines: u32,
    /// Refuse to tessellate beyond this many vertices.
    pub max_line_vertices: usize,
}

impl Default for TessellationOptions {
    fn default() -> Self {
        Self {
            sub_density: 1.0,
            bundle_step: DEFAULT_BUNDLE_STEP,
            max_bundle_lines: DEFAULT_MAX_BUNDLE_LINES,
            max_line_vertices: DEFAULT_MAX_LINE_VERTICES,
        }
    }
}

impl TessellationOptions {
    /// Options with every field forced into its usable range.
    pub fn sanitized(&self) -> Self {
        let sub_density = if self.sub_density.is_finite() {
            self.sub_density.clamp(1.0, MAX_SUB_DENSITY)
        } else {
            1.0
        };
        let bundle_step = if self.bundle_step.is_finite() && self.bundle_step > 0.0 {
            self.bundle_step
        } else {
            DEFAULT_BUNDLE_STEP
        };
        Self {
            sub_density,
            bundle_step,
            max_bundle_lines: self.max_bundle_lines.clamp(1, MAX_BUNDLE_LINES_LIMIT),
            max_line_vertices: self.max_line_vertices,
        }
    }

    /// Crosses per cell along one axis.
    pub fn crosses_per_cell_axis(&self) -> u32 {
        self.sanitized().sub_density.sqrt().ceil() as u32
    }

    /// Parallel lines used to fake a line of `thickness` (cell units).
    pub fn bundle_lines(&self, thickness: f32) -> u32 {
        let opts = self.sanitized();
        if !(thickness > 0.0) {
            return 0;
        }
        ((thickness / opts.bundle_step).ceil() as u32).clamp(1, opts.max_bundle_lines)
    }
}

/// Perpendicular offsets of `count` lines spread across `[-half_width, half_width]`,
/// symmetric around 0.
fn bundle_offsets(count: u32, half_width: f32) -> impl Iterator<Item = f32> {
    let step = if count > 0 {
        2.0 * half_width / count as f32
    } else {
        0.0
    };
    let mid = (count as f32 - 1.0) * 0.5;
    (0..count).map(move |i| (i as f32 - mid) * step)
}

/// Layout of the tessellated crosses for one parameter set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CrossLayout {
    /// Cross positions per axis across the whole surface.
    pub positions_per_axis: u32,
    /// Distance between neighbouring cross centres.
    pub spacing: f32,
    /// Arm half-length, world units.
    pub arm: f32,
    /// Line half-width, world units.
    pub half_width: f32,
    pub bundle_lines: u32,
}

impl CrossLayout {
    pub fn new(params: &PatternParameters, options: &TessellationOptions, extent: f32) -> Self {
        let per_axis = density_cells(params.density) * options.crosses_per_cell_axis();
        let spacing = extent.max(f32::EPSILON) / per_axis as f32;
        Self {
            positions_per_axis: per_axis,
            spacing,
            arm: cross_half_size(params.scale, params.density) * spacing,
            half_width: cross_half_width(params.thickness, params.density) * spacing,
            bundle_lines: options.bundle_lines(params.thickness),
        }
    }

    pub fn cross_count(&self) -> u64 {
        self.positions_per_axis as u64 * self.positions_per_axis as u64
    }

    /// Two bundles per cross, two vertices per segment.
    pub fn vertex_count(&self) -> u64 {
        self.cross_count() * self.bundle_lines as u64 * 4
    }
}

fn check_budget(vertices: u64, options: &TessellationOptions) -> Result<usize, PatternError> {
    let limit = options.max_line_vertices;
    if vertices > limit as u64 {
        return Err(PatternError::GeometryBudget {
            vertices: usize::try_from(vertices).unwrap_or(usize::MAX),
            limit,
        });
    }
    Ok(vertices as usize)
}

/// Exact vertex count [`tessellate_crosses`] would emit.
pub fn estimate_cross_vertices(
    params: &PatternParameters,
    options: &TessellationOptions,
    extent: f32,
) -> u64 {
    CrossLayout::new(params, options, extent).vertex_count()
}

/// Tessellate the cross pattern into one line list.
pub fn tessellate_crosses(
    params: &PatternParameters,
    options: &TessellationOptions,
    extent: f32,
) -> Result<Vec<LineVertex>, PatternError> {
    let layout = CrossLayout::new(params, options, extent);
    let capacity = check_budget(layout.vertex_count(), options)?;
    let mut vertices = Vec::with_capacity(capacity);
    if layout.bundle_lines == 0 {
        return Ok(vertices);
    }

    let half = extent * 0.5;
    let phase: Vec2 = params.offset * 0.5;
    let n = layout.positions_per_axis;
    for iz in 0..n {
        let cz = (iz as f32 + 0.5 - phase.y) * layout.spacing - half;
        for ix in 0..n {
            let cx = (ix as f32 + 0.5 - phase.x) * layout.spacing - half;
            for d in bundle_offsets(layout.bundle_lines, layout.half_width) {
                vertices.push(LineVertex::on_surface(cx - layout.arm, cz + d));
                vertices.push(LineVertex::on_surface(cx + layout.arm, cz + d));
            }
            for d in bundle_offsets(layout.bundle_lines, layout.half_width) {
                vertices.push(LineVertex::on_surface(cx + d, cz - layout.arm));
                vertices.push(LineVertex::on_surface(cx + d, cz + layout.arm));
            }
        }
    }

    log::debug!(
        "tessellated {} crosses ({} lines each) into {} vertices",
        layout.cross_count(),
        layout.bundle_lines * 2,
        vertices.len()
    );
    Ok(vertices)
}

/// Exact vertex count [`tessellate_grid`] would emit.
pub fn estimate_grid_vertices(
    params: &PatternParameters,
    options: &TessellationOptions,
    extent: f32,
) -> u64 {
    let grid = GridEvaluator::new(params);
    let half = extent * 0.5;
    let lines = grid
        .line_count(half, params.offset.x)
        .saturating_add(grid.line_count(half, params.offset.y));
    lines
        .saturating_mul(options.bundle_lines(params.thickness) as u64)
        .saturating_mul(2)
}

/// Tessellate the grid into one line list of full-extent segments.
pub fn tessellate_grid(
    params: &PatternParameters,
    options: &TessellationOptions,
    extent: f32,
) -> Result<Vec<LineVertex>, PatternError> {
    let capacity = check_budget(estimate_grid_vertices(params, options, extent), options)?;
    let grid = GridEvaluator::new(params);
    let half = extent * 0.5;
    let bundle = options.bundle_lines(params.thickness);
    // Thickness is in cell units; one cell is `1 / scale` world units.
    let half_width = params.thickness / grid.scale();

    let mut vertices = Vec::with_capacity(capacity);
    for x in grid.line_positions(half, params.offset.x) {
        for d in bundle_offsets(bundle, half_width) {
            vertices.push(LineVertex::on_surface(x + d, -half));
            vertices.push(LineVertex::on_surface(x + d, half));
        }
    }
    for z in grid.line_positions(half, params.offset.y) {
        for d in bundle_offsets(bundle, half_width) {
            vertices.push(LineVertex::on_surface(-half, z + d));
            vertices.push(LineVertex::on_surface(half, z + d));
        }
    }
    Ok(vertices)
}

/// Raw bytes of a line list, as uploaded to the GPU.
pub fn line_bytes(vertices: &[LineVertex]) -> &[u8] {
    bytemuck::cast_slice(vertices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParameterStore, PartialParameters, PatternKind};

    const EXTENT: f32 = 10.0;

    fn params(kind: PatternKind, partial: PartialParameters) -> PatternParameters {
        let mut store = ParameterStore::new(kind);
        store.update(&partial);
        store.get()
    }

    #[test]
    fn test_crosses_per_cell() {
        let mut options = TessellationOptions::default();
        assert_eq!(options.crosses_per_cell_axis(), 1);
        options.sub_density = 2.0;
        assert_eq!(options.crosses_per_cell_axis(), 2);
        options.sub_density = 9.0;
        assert_eq!(options.crosses_per_cell_axis(), 3);
        options.sub_density = f32::NAN;
        assert_eq!(options.crosses_per_cell_axis(), 1);
    }

    #[test]
    fn test_bundle_lines() {
        let options = TessellationOptions::default();
        assert_eq!(options.bundle_lines(0.0), 0);
        assert_eq!(options.bundle_lines(0.001), 1);
        assert_eq!(options.bundle_lines(0.0175), 3);
        assert_eq!(options.bundle_lines(0.5), DEFAULT_MAX_BUNDLE_LINES);
        let offsets: Vec<f32> = bundle_offsets(3, 0.003).collect();
        assert_eq!(offsets.len(), 3);
        assert!((offsets[0] + 0.002).abs() < 1e-7);
        assert_eq!(offsets[1], 0.0);
        assert!((offsets[2] - 0.002).abs() < 1e-7);
    }

    #[test]
    fn test_vertex_count_grows_with_density() {
        let options = TessellationOptions::default();
        let mut last = 0;
        for density in [1.0, 2.0, 5.0, 18.0, 45.0, 100.0, 256.0] {
            let p = params(PatternKind::Cross, PartialParameters::new().density(density));
            let count = estimate_cross_vertices(&p, &options, EXTENT);
            assert!(count > last, "density {}", density);
            last = count;
        }
        // Densest default layout still fits the budget
        assert!(last <= DEFAULT_MAX_LINE_VERTICES as u64);
    }

    #[test]
    fn test_deterministic_bytes() {
        let p = params(
            PatternKind::Cross,
            PartialParameters::new().density(18.5).offset([0.3, 0.7]),
        );
        let options = TessellationOptions::default();
        let a = tessellate_crosses(&p, &options, EXTENT).unwrap();
        let b = tessellate_crosses(&p, &options, EXTENT).unwrap();
        assert_eq!(line_bytes(&a), line_bytes(&b));
    }

    #[test]
    fn test_estimate_matches_output() {
        let options = TessellationOptions::default();
        for density in [1.0, 7.0, 18.0, 45.0] {
            let p = params(PatternKind::Cross, PartialParameters::new().density(density));
            let vertices = tessellate_crosses(&p, &options, EXTENT).unwrap();
            assert_eq!(vertices.len() as u64, estimate_cross_vertices(&p, &options, EXTENT));
        }
        let g = params(PatternKind::Grid, PartialParameters::new().thickness(0.02));
        let vertices = tessellate_grid(&g, &options, EXTENT).unwrap();
        assert_eq!(vertices.len() as u64, estimate_grid_vertices(&g, &options, EXTENT));
    }

    #[test]
    fn test_single_cross_is_centred() {
        let p = params(PatternKind::Cross, PartialParameters::new().density(1.0));
        let vertices = tessellate_crosses(&p, &TessellationOptions::default(), EXTENT).unwrap();
        assert!(!vertices.is_empty());
        let sum = vertices
            .iter()
            .fold(Vec2::ZERO, |acc, v| acc + Vec2::new(v.position[0], v.position[2]));
        let centroid = sum / vertices.len() as f32;
        assert!(centroid.length() < 1e-5);
        assert!(vertices.iter().all(|v| v.position[1] == crate::gpu::mesh::LINE_LIFT));
    }

    #[test]
    fn test_zero_thickness_emits_nothing() {
        let p = params(PatternKind::Cross, PartialParameters::new().thickness(0.0));
        assert!(tessellate_crosses(&p, &TessellationOptions::default(), EXTENT)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_budget_is_enforced() {
        let p = params(PatternKind::Cross, PartialParameters::new().density(256.0));
        let options = TessellationOptions {
            max_line_vertices: 1000,
            ..TessellationOptions::default()
        };
        match tessellate_crosses(&p, &options, EXTENT) {
            Err(PatternError::GeometryBudget { limit, vertices }) => {
                assert_eq!(limit, 1000);
                assert!(vertices > 1000);
            }
            other => panic!("expected budget error, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_huge_grid_is_rejected_before_tessellating() {
        let g = params(PatternKind::Grid, PartialParameters::new().scale(100.0));
        let options = TessellationOptions::default();
        let estimate = estimate_grid_vertices(&g, &options, 1e12);
        assert!(estimate > 1 << 40);
        assert!(matches!(
            tessellate_grid(&g, &options, 1e12),
            Err(PatternError::GeometryBudget { .. })
        ));
    }

    #[test]
    fn test_sub_density_packs_more_crosses() {
        let p = params(PatternKind::Cross, PartialParameters::new().density(4.0));
        let single = CrossLayout::new(&p, &TessellationOptions::default(), EXTENT);
        let packed = CrossLayout::new(
            &p,
            &TessellationOptions {
                sub_density: 4.0,
                ..TessellationOptions::default()
            },
            EXTENT,
        );
        assert_eq!(single.cross_count(), 16);
        assert_eq!(packed.cross_count(), 64);
    }

    #[test]
    fn test_grid_lines_span_surface() {
        let g = params(PatternKind::Grid, PartialParameters::new().thickness(0.001));
        let vertices = tessellate_grid(&g, &TessellationOptions::default(), EXTENT).unwrap();
        // 11 lines per axis, one segment each
        assert_eq!(vertices.len(), 2 * 11 * 2);
        assert_eq!(vertices[0].position, [-5.0, crate::gpu::mesh::LINE_LIFT, -5.0]);
        assert_eq!(vertices[1].position, [-5.0, crate::gpu::mesh::LINE_LIFT, 5.0]);
    }
}

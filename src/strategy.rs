//! Render strategies.
//!
//! A pattern is drawn by exactly one strategy at a time:
//!
//! - `AnalyticShaded`: one surface quad, coverage evaluated per fragment.
//! - `CpuTessellatedLines`: the pattern baked into a line list on the CPU.
//! - `HybridMeshNode`: the surface split into one mesh node per cell, each
//!   shaded with the analytic program.
//!
//! The lifecycle manager treats them uniformly; they only differ in the
//! geometry they need and in which parameter edits invalidate it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PatternError;
use crate::gpu::mesh::{create_surface_quad, create_unit_cell, CellInstance, LineVertex, SurfaceVertex};
use crate::params::{
    density_cells, ChangedFields, ParamField, PatternKind, PatternParameters, SCALE_EPSILON,
};
use crate::tessellate::{tessellate_crosses, tessellate_grid, TessellationOptions};

/// Upper bound on hybrid grid tiles per axis.
pub const MAX_HYBRID_TILES: u32 = 256;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStrategy {
    #[default]
    AnalyticShaded,
    CpuTessellatedLines,
    HybridMeshNode,
}

impl RenderStrategy {
    pub const ALL: [RenderStrategy; 3] = [
        RenderStrategy::AnalyticShaded,
        RenderStrategy::CpuTessellatedLines,
        RenderStrategy::HybridMeshNode,
    ];

    /// Strategy a layer starts with when none is configured. Crosses are
    /// only a few pixels across at a normal viewing distance, and line
    /// primitives never rasterize thinner than one pixel.
    pub fn default_for(kind: PatternKind) -> Self {
        match kind {
            PatternKind::Grid => RenderStrategy::AnalyticShaded,
            PatternKind::Cross => RenderStrategy::CpuTessellatedLines,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RenderStrategy::AnalyticShaded => "analytic_shaded",
            RenderStrategy::CpuTessellatedLines => "cpu_tessellated_lines",
            RenderStrategy::HybridMeshNode => "hybrid_mesh_node",
        }
    }

    /// Fields whose change invalidates this strategy's geometry for `kind`.
    ///
    /// Colour is a uniform for every strategy. Density is structural for the
    /// cross everywhere.
    pub fn rebuild_fields(&self, kind: PatternKind) -> ChangedFields {
        use ParamField::*;
        match (self, kind) {
            (RenderStrategy::AnalyticShaded, PatternKind::Grid) => ChangedFields::NONE,
            (RenderStrategy::AnalyticShaded, PatternKind::Cross) => ChangedFields::only(Density),
            (RenderStrategy::HybridMeshNode, PatternKind::Grid) => ChangedFields::only(Scale),
            (RenderStrategy::HybridMeshNode, PatternKind::Cross) => ChangedFields::only(Density),
            (RenderStrategy::CpuTessellatedLines, PatternKind::Grid) => {
                ChangedFields::of(&[Scale, Thickness, Offset])
            }
            (RenderStrategy::CpuTessellatedLines, PatternKind::Cross) => {
                ChangedFields::of(&[Density, Scale, Thickness, Offset])
            }
        }
    }

    pub fn requires_rebuild(&self, kind: PatternKind, changed: &ChangedFields) -> bool {
        changed.intersects(&self.rebuild_fields(kind))
    }

    /// Geometry this strategy needs for the given parameters.
    pub fn build_geometry(
        &self,
        kind: PatternKind,
        params: &PatternParameters,
        options: &TessellationOptions,
        extent: f32,
    ) -> Result<StrategyGeometry, PatternError> {
        match self {
            RenderStrategy::AnalyticShaded => {
                let (vertices, indices) = create_surface_quad(extent);
                Ok(StrategyGeometry::Surface { vertices, indices })
            }
            RenderStrategy::CpuTessellatedLines => {
                let vertices = match kind {
                    PatternKind::Grid => tessellate_grid(params, options, extent)?,
                    PatternKind::Cross => tessellate_crosses(params, options, extent)?,
                };
                Ok(StrategyGeometry::Lines { vertices })
            }
            RenderStrategy::HybridMeshNode => {
                let tiles = hybrid_tiles(kind, params, extent);
                let size = extent / tiles as f32;
                let half = extent * 0.5;
                let instances = (0..tiles)
                    .flat_map(|z| (0..tiles).map(move |x| (x, z)))
                    .map(|(x, z)| {
                        CellInstance::new(
                            [
                                (x as f32 + 0.5) * size - half,
                                (z as f32 + 0.5) * size - half,
                            ],
                            size,
                        )
                    })
                    .collect();
                let (vertices, indices) = create_unit_cell();
                Ok(StrategyGeometry::Cells {
                    vertices,
                    indices,
                    instances,
                })
            }
        }
    }
}

/// Mesh nodes per axis for the hybrid strategy.
///
/// The cross gets one node per cell; the grid one per grid cell, capped.
pub fn hybrid_tiles(kind: PatternKind, params: &PatternParameters, extent: f32) -> u32 {
    match kind {
        PatternKind::Cross => density_cells(params.density),
        PatternKind::Grid => {
            let tiles = (extent * params.scale.max(SCALE_EPSILON)).ceil();
            if tiles.is_finite() {
                (tiles as u32).clamp(1, MAX_HYBRID_TILES)
            } else {
                1
            }
        }
    }
}

impl fmt::Display for RenderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RenderStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "analytic" | "analytic_shaded" => Ok(RenderStrategy::AnalyticShaded),
            "lines" | "cpu_tessellated_lines" => Ok(RenderStrategy::CpuTessellatedLines),
            "hybrid" | "hybrid_mesh_node" => Ok(RenderStrategy::HybridMeshNode),
            other => Err(format!(
                "unknown strategy '{}' (expected analytic, lines or hybrid)",
                other
            )),
        }
    }
}

/// CPU-side geometry for one strategy, ready for upload.
#[derive(Clone, Debug, PartialEq)]
pub enum StrategyGeometry {
    Surface {
        vertices: Vec<SurfaceVertex>,
        indices: Vec<u16>,
    },
    Lines {
        vertices: Vec<LineVertex>,
    },
    Cells {
        vertices: Vec<SurfaceVertex>,
        indices: Vec<u16>,
        instances: Vec<CellInstance>,
    },
}

impl StrategyGeometry {
    pub fn vertex_bytes(&self) -> &[u8] {
        match self {
            StrategyGeometry::Surface { vertices, .. } => bytemuck::cast_slice(vertices),
            StrategyGeometry::Lines { vertices } => bytemuck::cast_slice(vertices),
            StrategyGeometry::Cells { vertices, .. } => bytemuck::cast_slice(vertices),
        }
    }

    pub fn index_bytes(&self) -> &[u8] {
        match self {
            StrategyGeometry::Surface { indices, .. } | StrategyGeometry::Cells { indices, .. } => {
                bytemuck::cast_slice(indices)
            }
            StrategyGeometry::Lines { .. } => &[],
        }
    }

    pub fn instance_bytes(&self) -> &[u8] {
        match self {
            StrategyGeometry::Cells { instances, .. } => bytemuck::cast_slice(instances),
            _ => &[],
        }
    }

    /// Total bytes that would be uploaded.
    pub fn byte_len(&self) -> u64 {
        (self.vertex_bytes().len() + self.index_bytes().len() + self.instance_bytes().len()) as u64
    }

    pub fn vertex_count(&self) -> usize {
        match self {
            StrategyGeometry::Surface { vertices, .. } | StrategyGeometry::Cells { vertices, .. } => {
                vertices.len()
            }
            StrategyGeometry::Lines { vertices } => vertices.len(),
        }
    }

    pub fn index_count(&self) -> usize {
        match self {
            StrategyGeometry::Surface { indices, .. } | StrategyGeometry::Cells { indices, .. } => {
                indices.len()
            }
            StrategyGeometry::Lines { .. } => 0,
        }
    }

    pub fn instance_count(&self) -> usize {
        match self {
            StrategyGeometry::Cells { instances, .. } => instances.len(),
            _ => 1,
        }
    }

    /// Nothing to draw (e.g. zero-thickness lines).
    pub fn is_empty(&self) -> bool {
        self.vertex_count() == 0 || self.instance_count() == 0
    }
}

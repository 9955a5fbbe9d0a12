//! CPU reference renderer.
//!
//! Ray-casts every pixel onto the ground plane and shades it with the
//! analytic evaluators, so it always shows the exact analytic result
//! regardless of the strategy a layer uses on the GPU. Screen-space
//! derivatives come from the neighbouring pixels' hits, the same finite
//! differences a fragment shader gets from `dpdx` / `dpdy`.

use glam::{Vec2, Vec3};

use crate::backend::PatternBackend;
use crate::color::Rgb;
use crate::compositor::{composite, FadeSettings};
use crate::config::{FloorConfig, LayerConfig};
use crate::cross::CrossEvaluator;
use crate::floor::Floor;
use crate::grid::GridEvaluator;
use crate::params::{ParameterStore, PatternKind, PatternParameters};
use crate::shading::Footprint;
use crate::view::{hit_ground, CameraView};

/// Everything the preview needs to shade one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PreviewScene {
    pub grid: PatternParameters,
    pub cross: PatternParameters,
    pub extent: f32,
    pub fade: FadeSettings,
    pub ground_color: Rgb,
    pub background_color: Rgb,
}

impl PreviewScene {
    /// Snapshot the current state of a live floor.
    pub fn from_floor<B: PatternBackend>(floor: &Floor<B>, background_color: Rgb) -> Self {
        Self {
            grid: floor.params(PatternKind::Grid),
            cross: floor.params(PatternKind::Cross),
            extent: floor.extent(),
            fade: floor.fade(),
            ground_color: floor.ground_color(),
            background_color,
        }
    }

    /// Scene described by a configuration, with layer parameters clamped the
    /// same way live edits are.
    pub fn from_config(config: &FloorConfig) -> Self {
        let resolve = |kind: PatternKind, layer: &LayerConfig| {
            let mut store = ParameterStore::new(kind);
            store.update(&layer.params);
            store.get()
        };
        Self {
            grid: resolve(PatternKind::Grid, &config.grid),
            cross: resolve(PatternKind::Cross, &config.cross),
            extent: config.extent,
            fade: config.fade,
            ground_color: config.ground_color,
            background_color: config.background_color,
        }
    }

    fn shade_with(
        &self,
        grid: &GridEvaluator,
        cross: &CrossEvaluator,
        p: Vec2,
        footprint: &Footprint,
        eye: Vec3,
    ) -> Rgb {
        let distance = eye.distance(Vec3::new(p.x, 0.0, p.y));
        let layers = [grid.sample(p, footprint), cross.sample(p, footprint)];
        composite(self.ground_color, &layers, &self.fade, distance)
    }

    fn on_surface(&self, hit: Vec3) -> bool {
        let half = self.extent * 0.5;
        hit.x.abs() <= half && hit.z.abs() <= half
    }
}

/// Render the scene into a tightly packed RGBA8 buffer, rows top to bottom.
pub fn render_preview(scene: &PreviewScene, view: &CameraView, width: u32, height: u32) -> Vec<u8> {
    let width = width.max(1) as usize;
    let height = height.max(1) as usize;
    let inverse = view.view_proj(width as f32 / height as f32).inverse();

    // One extra column and row so every pixel has a right and lower neighbour.
    let stride = width + 1;
    let hits: Vec<Option<Vec3>> = (0..=height)
        .flat_map(|y| (0..=width).map(move |x| (x, y)))
        .map(|(x, y)| {
            let ndc_x = (x as f32 + 0.5) / width as f32 * 2.0 - 1.0;
            let ndc_y = 1.0 - (y as f32 + 0.5) / height as f32 * 2.0;
            let (origin, direction) = view.ray(&inverse, ndc_x, ndc_y);
            hit_ground(origin, direction)
        })
        .collect();

    let grid = GridEvaluator::new(&scene.grid);
    let cross = CrossEvaluator::new(&scene.cross, scene.extent);
    let background = scene.background_color.to_u8();

    let mut pixels = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            let rgb = match hits[y * stride + x] {
                Some(hit) if scene.on_surface(hit) => {
                    let p = Vec2::new(hit.x, hit.z);
                    let footprint = match (hits[y * stride + x + 1], hits[(y + 1) * stride + x]) {
                        (Some(right), Some(below)) => {
                            Footprint::new(Vec2::new(right.x, right.z) - p, Vec2::new(below.x, below.z) - p)
                        }
                        _ => Footprint::Unavailable,
                    };
                    scene.shade_with(&grid, &cross, p, &footprint, view.eye).to_u8()
                }
                _ => background,
            };
            pixels.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
    }

    log::debug!(
        "preview {}x{}: {} ground hits, {} cross cells",
        width,
        height,
        hits.iter().filter(|h| h.is_some()).count(),
        cross.cells()
    );
    pixels
}

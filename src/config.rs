//! JSON configuration for the command line tool.
//!
//! Everything is optional; missing fields take the floor defaults. Pattern
//! parameters given here are applied as the first partial update after
//! start-up, so they are clamped exactly like live edits.

use std::path::Path;

use anyhow::{bail, Context, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::compositor::FadeSettings;
use crate::params::{PartialParameters, PatternKind};
use crate::strategy::RenderStrategy;
use crate::tessellate::TessellationOptions;
use crate::view::CameraView;

pub const DEFAULT_EXTENT: f32 = 10.0;

/// One pattern layer: how it is drawn and its initial parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayerConfig {
    /// `None` picks [`RenderStrategy::default_for`] the layer's kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<RenderStrategy>,
    pub params: PartialParameters,
}

impl LayerConfig {
    pub fn strategy_for(&self, kind: PatternKind) -> RenderStrategy {
        self.strategy.unwrap_or_else(|| RenderStrategy::default_for(kind))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraConfig {
    pub eye: [f32; 3],
    pub target: [f32; 3],
    pub fov_y_degrees: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let view = CameraView::default();
        Self {
            eye: view.eye.to_array(),
            target: view.target.to_array(),
            fov_y_degrees: view.fov_y_degrees,
        }
    }
}

impl CameraConfig {
    pub fn to_view(&self) -> CameraView {
        CameraView::new(Vec3::from_array(self.eye), Vec3::from_array(self.target))
            .with_fov(self.fov_y_degrees)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FloorConfig {
    /// Side length of the square surface, in world units.
    pub extent: f32,
    pub grid: LayerConfig,
    pub cross: LayerConfig,
    pub fade: FadeSettings,
    pub ground_color: Rgb,
    pub background_color: Rgb,
    pub tessellation: TessellationOptions,
    pub camera: CameraConfig,
}

impl Default for FloorConfig {
    fn default() -> Self {
        let night = Rgb::from_u8(0x1b, 0x19, 0x1f);
        Self {
            extent: DEFAULT_EXTENT,
            grid: LayerConfig::default(),
            cross: LayerConfig::default(),
            fade: FadeSettings::default(),
            ground_color: night,
            background_color: night,
            tessellation: TessellationOptions::default(),
            camera: CameraConfig::default(),
        }
    }
}

impl FloorConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: FloorConfig = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot be clamped into something meaningful.
    pub fn validate(&self) -> Result<()> {
        if !(self.extent.is_finite() && self.extent > 0.0) {
            bail!("extent must be a positive number, got {}", self.extent);
        }
        if !self.fade.is_valid() {
            bail!(
                "fade needs 0 <= near < far, got near {} far {}",
                self.fade.near,
                self.fade.far
            );
        }
        let fov = self.camera.fov_y_degrees;
        if !(fov > 0.0 && fov < 180.0) {
            bail!("camera fovYDegrees must be in (0, 180), got {}", fov);
        }
        if self.tessellation.max_line_vertices == 0 {
            bail!("tessellation maxLineVertices must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config: FloorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, FloorConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.ground_color.to_hex(), "#1b191f");
    }

    #[test]
    fn test_parse_layers() {
        let config: FloorConfig = serde_json::from_str(
            r##"{
                "grid": { "strategy": "cpu_tessellated_lines", "params": { "thickness": 0.01 } },
                "cross": { "params": { "density": 18, "color": "#00ff00" } },
                "fade": { "near": 10, "far": 30 },
                "tessellation": { "subDensity": 4 }
            }"##,
        )
        .unwrap();
        assert_eq!(config.grid.strategy, Some(RenderStrategy::CpuTessellatedLines));
        assert_eq!(config.grid.params.thickness, Some(0.01));
        assert_eq!(config.cross.strategy, None);
        assert_eq!(
            config.cross.strategy_for(PatternKind::Cross),
            RenderStrategy::CpuTessellatedLines
        );
        assert_eq!(config.cross.params.density, Some(18.0));
        assert_eq!(config.fade, FadeSettings::new(10.0, 30.0));
        assert_eq!(config.tessellation.sub_density, 4.0);
    }

    #[test]
    fn test_layer_strategy_defaults_per_kind() {
        let config = FloorConfig::default();
        assert_eq!(config.grid.strategy_for(PatternKind::Grid), RenderStrategy::AnalyticShaded);
        assert_eq!(
            config.cross.strategy_for(PatternKind::Cross),
            RenderStrategy::CpuTessellatedLines
        );

        let config: FloorConfig =
            serde_json::from_str(r#"{ "cross": { "strategy": "hybrid_mesh_node" } }"#).unwrap();
        assert_eq!(
            config.cross.strategy_for(PatternKind::Cross),
            RenderStrategy::HybridMeshNode
        );
    }

    #[test]
    fn test_validate_rejects_bad_fade() {
        let config = FloorConfig {
            fade: FadeSettings::new(40.0, 20.0),
            ..FloorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = FloorConfig::from_file(Path::new("/nonexistent/floor.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}

//! Distance fade and layer composition.
//!
//! Every pattern renders as a transparent overlay: its colour plus a coverage
//! that acts as alpha. Layers are stacked above an opaque ground colour in a
//! fixed order (grid beneath cross). The distance fade only scales coverage;
//! colour is never touched.

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::shading::smoothstep;

pub const DEFAULT_FADE_NEAR: f32 = 20.0;
pub const DEFAULT_FADE_FAR: f32 = 40.0;

/// Colour and coverage of one pattern layer at one sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatternSample {
    pub color: Rgb,
    /// Alpha in [0, 1].
    pub coverage: f32,
}

impl PatternSample {
    pub fn new(color: Rgb, coverage: f32) -> Self {
        let coverage = if coverage.is_finite() {
            coverage.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { color, coverage }
    }

    /// Colour multiplied by coverage, with coverage as alpha.
    pub fn premultiplied(&self) -> [f32; 4] {
        [
            self.color.r * self.coverage,
            self.color.g * self.coverage,
            self.color.b * self.coverage,
            self.coverage,
        ]
    }

    /// Same colour, coverage scaled by `factor`.
    pub fn faded(&self, factor: f32) -> Self {
        Self::new(self.color, self.coverage * factor)
    }

    /// Opaque mode: the pattern colour mixed into `background` by coverage.
    pub fn over(&self, background: Rgb) -> Rgb {
        background.mix(self.color, self.coverage)
    }
}

/// Fade thresholds, in world units from the viewer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FadeSettings {
    pub near: f32,
    pub far: f32,
}

impl Default for FadeSettings {
    fn default() -> Self {
        Self {
            near: DEFAULT_FADE_NEAR,
            far: DEFAULT_FADE_FAR,
        }
    }
}

impl FadeSettings {
    pub fn new(near: f32, far: f32) -> Self {
        Self { near, far }
    }

    pub fn is_valid(&self) -> bool {
        self.near.is_finite() && self.far.is_finite() && self.near >= 0.0 && self.near < self.far
    }

    /// Opacity multiplier: 1 up to `near`, 0 from `far` on, smooth and
    /// non-increasing in between.
    pub fn factor(&self, distance: f32) -> f32 {
        if !distance.is_finite() {
            return 0.0;
        }
        1.0 - smoothstep(self.near, self.far, distance)
    }

    pub fn apply(&self, sample: PatternSample, distance: f32) -> PatternSample {
        sample.faded(self.factor(distance))
    }
}

/// Composite faded overlay layers, bottom first, onto an opaque ground.
pub fn composite(ground: Rgb, layers: &[PatternSample], fade: &FadeSettings, distance: f32) -> Rgb {
    let factor = fade.factor(distance);
    layers
        .iter()
        .fold(ground, |below, layer| layer.faded(factor).over(below))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_thresholds() {
        let fade = FadeSettings::default();
        assert_eq!(fade.factor(0.0), 1.0);
        assert_eq!(fade.factor(20.0), 1.0);
        assert!((fade.factor(30.0) - 0.5).abs() < 1e-6);
        assert_eq!(fade.factor(40.0), 0.0);
        assert_eq!(fade.factor(1000.0), 0.0);
        assert_eq!(fade.factor(f32::NAN), 0.0);
    }

    #[test]
    fn test_fade_is_monotonic() {
        let fade = FadeSettings::default();
        let mut last = fade.factor(0.0);
        for i in 0..500 {
            let f = fade.factor(i as f32 * 0.1);
            assert!(f <= last);
            last = f;
        }
    }

    #[test]
    fn test_fade_keeps_colour() {
        let fade = FadeSettings::default();
        let sample = PatternSample::new(Rgb::from_u8(0xff, 0x5f, 0x1f), 0.8);
        let faded = fade.apply(sample, 35.0);
        assert_eq!(faded.color, sample.color);
        assert!(faded.coverage < sample.coverage);
    }

    #[test]
    fn test_layer_order() {
        let ground = Rgb::BLACK;
        let grid = PatternSample::new(Rgb::new(0.0, 1.0, 0.0), 1.0);
        let cross = PatternSample::new(Rgb::new(1.0, 0.0, 0.0), 1.0);
        let fade = FadeSettings::default();
        assert_eq!(composite(ground, &[grid, cross], &fade, 1.0), Rgb::new(1.0, 0.0, 0.0));
        assert_eq!(composite(ground, &[grid], &fade, 50.0), ground);
    }

    #[test]
    fn test_premultiplied() {
        let sample = PatternSample::new(Rgb::new(1.0, 0.5, 0.0), 0.5);
        assert_eq!(sample.premultiplied(), [0.5, 0.25, 0.0, 0.5]);
        assert_eq!(PatternSample::new(Rgb::WHITE, 3.0).coverage, 1.0);
        assert!(!FadeSettings::new(40.0, 20.0).is_valid());
    }
}

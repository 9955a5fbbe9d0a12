//! RGB colours as edited by the parameter panel (`#rrggbb`).

use serde::{Deserialize, Serialize};

use crate::error::PatternError;

/// RGB colour with channels in [0, 1].
///
/// Values are used as-is by both the CPU preview and the GPU path (the
/// render target is a non-sRGB format), so no transfer function is applied.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);
    pub const WHITE: Rgb = Rgb::new(1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Build from 8-bit channels.
    pub fn from_u8(r: u8, g: u8, b: u8) -> Self {
        Self::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }

    /// Parse `#rrggbb` or `rrggbb`.
    pub fn from_hex(hex: &str) -> Result<Self, PatternError> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PatternError::InvalidColor(hex.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .map_err(|_| PatternError::InvalidColor(hex.to_string()))
        };
        Ok(Self::from_u8(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    /// Format as lowercase `#rrggbb`.
    pub fn to_hex(&self) -> String {
        let [r, g, b] = self.to_u8();
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }

    pub fn to_u8(&self) -> [u8; 3] {
        let quantize = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [quantize(self.r), quantize(self.g), quantize(self.b)]
    }

    /// Clamp every channel into [0, 1]; non-finite channels become 0.
    pub fn clamped(&self) -> Self {
        let fix = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        Self::new(fix(self.r), fix(self.g), fix(self.b))
    }

    pub fn is_finite(&self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite()
    }

    /// Linear interpolation towards `other`.
    pub fn mix(&self, other: Rgb, t: f32) -> Self {
        Self::new(
            self.r + (other.r - self.r) * t,
            self.g + (other.g - self.g) * t,
            self.b + (other.b - self.b) * t,
        )
    }

    /// Pack as `[r, g, b, alpha]` for uniform upload.
    pub fn to_array4(&self, alpha: f32) -> [f32; 4] {
        [self.r, self.g, self.b, alpha]
    }
}

impl TryFrom<String> for Rgb {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rgb::from_hex(&value)
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_hex()
    }
}

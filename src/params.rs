//! Pattern parameter store.
//!
//! Holds the canonical parameter state for one pattern (grid or cross).
//! Updates arrive as partial records from the editing collaborator; every
//! field is clamped into its documented range rather than rejected, because
//! this is a live-tunable visual system. The returned [`ChangeSet`] tells the
//! lifecycle manager which fields changed and whether the change is
//! structural (cell partitioning) or scalar-only.
//!
//! Documented ranges:
//! - `scale`: `[0.001, 100]` for the grid, `[0.001, 1]` for the cross
//! - `thickness`: `[0, 0.5]` (line half-width in cell units)
//! - `offset`: wrapped into `[0, 1)` per component (the phase is periodic)
//! - `color`: channels clamped into `[0, 1]`
//! - `density`: `[1, 256]`, cross only
//!
//! Non-finite values are dropped field-by-field and the previous value kept.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::color::Rgb;

/// Smallest scale ever used; keeps every `1 / scale` finite.
pub const SCALE_EPSILON: f32 = 1e-3;
pub const MAX_GRID_SCALE: f32 = 100.0;
pub const MAX_CROSS_SCALE: f32 = 1.0;
pub const MAX_THICKNESS: f32 = 0.5;
pub const MIN_DENSITY: f32 = 1.0;
pub const MAX_DENSITY: f32 = 256.0;

/// The two pattern families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Grid,
    Cross,
}

impl PatternKind {
    pub fn label(&self) -> &'static str {
        match self {
            PatternKind::Grid => "grid",
            PatternKind::Cross => "cross",
        }
    }

    fn max_scale(&self) -> f32 {
        match self {
            PatternKind::Grid => MAX_GRID_SCALE,
            PatternKind::Cross => MAX_CROSS_SCALE,
        }
    }
}

/// Individually addressable parameter fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamField {
    Scale,
    Thickness,
    Offset,
    Color,
    Density,
}

impl ParamField {
    pub const ALL: [ParamField; 5] = [
        ParamField::Scale,
        ParamField::Thickness,
        ParamField::Offset,
        ParamField::Color,
        ParamField::Density,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ParamField::Scale => "scale",
            ParamField::Thickness => "thickness",
            ParamField::Offset => "offset",
            ParamField::Color => "color",
            ParamField::Density => "density",
        }
    }
}

/// A set of [`ParamField`]s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangedFields {
    pub scale: bool,
    pub thickness: bool,
    pub offset: bool,
    pub color: bool,
    pub density: bool,
}

impl ChangedFields {
    pub const NONE: ChangedFields = ChangedFields {
        scale: false,
        thickness: false,
        offset: false,
        color: false,
        density: false,
    };

    pub fn only(field: ParamField) -> Self {
        let mut fields = Self::NONE;
        fields.insert(field);
        fields
    }

    pub fn of(fields: &[ParamField]) -> Self {
        let mut set = Self::NONE;
        for field in fields {
            set.insert(*field);
        }
        set
    }

    pub fn contains(&self, field: ParamField) -> bool {
        match field {
            ParamField::Scale => self.scale,
            ParamField::Thickness => self.thickness,
            ParamField::Offset => self.offset,
            ParamField::Color => self.color,
            ParamField::Density => self.density,
        }
    }

    pub fn insert(&mut self, field: ParamField) {
        match field {
            ParamField::Scale => self.scale = true,
            ParamField::Thickness => self.thickness = true,
            ParamField::Offset => self.offset = true,
            ParamField::Color => self.color = true,
            ParamField::Density => self.density = true,
        }
    }

    pub fn union(&self, other: &ChangedFields) -> Self {
        Self {
            scale: self.scale || other.scale,
            thickness: self.thickness || other.thickness,
            offset: self.offset || other.offset,
            color: self.color || other.color,
            density: self.density || other.density,
        }
    }

    pub fn intersects(&self, other: &ChangedFields) -> bool {
        self.iter().any(|field| other.contains(field))
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn iter(&self) -> impl Iterator<Item = ParamField> + '_ {
        ParamField::ALL.into_iter().filter(|field| self.contains(*field))
    }
}

/// Classification of a parameter edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// Nothing observable changed.
    None,
    /// Purely numeric; live uniforms can be rewritten in place.
    ScalarOnly,
    /// Cell partitioning changed; resources must be rebuilt.
    Structural,
}

/// Result of [`ParameterStore::update`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChangeSet {
    pub pattern: PatternKind,
    /// Fields whose stored value differs from before the update.
    pub fields: ChangedFields,
    /// Fields whose requested value was clamped, wrapped or dropped.
    /// Editors displaying values should read them back from the store.
    pub adjusted: ChangedFields,
    pub kind: ChangeKind,
    /// Store revision after the update.
    pub revision: u64,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.kind == ChangeKind::None
    }

    pub fn is_structural(&self) -> bool {
        self.kind == ChangeKind::Structural
    }
}

/// Full parameter snapshot for one pattern.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatternParameters {
    /// Spatial frequency (grid) or cross half-size factor (cross).
    pub scale: f32,
    /// Line half-width in cell units; 0 draws nothing.
    pub thickness: f32,
    /// Phase shift within the cell, each component in [0, 1).
    pub offset: Vec2,
    pub color: Rgb,
    /// Cells across the surface extent. Continuous; floored for partitioning.
    /// Unused by the grid.
    pub density: f32,
}

impl PatternParameters {
    /// Defaults restored on every (re)initialisation.
    pub fn defaults(kind: PatternKind) -> Self {
        match kind {
            PatternKind::Grid => Self {
                scale: 1.0,
                thickness: 0.007,
                offset: Vec2::ZERO,
                color: Rgb::from_u8(0xd3, 0xd3, 0xd3),
                density: MIN_DENSITY,
            },
            PatternKind::Cross => Self {
                scale: 0.022,
                thickness: 0.028,
                offset: Vec2::ZERO,
                color: Rgb::from_u8(0xff, 0x5f, 0x1f),
                density: 45.0,
            },
        }
    }

    /// Integer cell count per axis derived from density (always >= 1).
    pub fn cell_count(&self) -> u32 {
        density_cells(self.density)
    }
}

/// Floor a continuous density into a whole cell count >= 1.
pub fn density_cells(density: f32) -> u32 {
    if density.is_finite() {
        density.floor().clamp(MIN_DENSITY, MAX_DENSITY) as u32
    } else {
        MIN_DENSITY as u32
    }
}

/// Offset as edited: one value for both axes, or a 2D vector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OffsetValue {
    Uniform(f32),
    Vector([f32; 2]),
}

impl OffsetValue {
    pub fn to_vec2(&self) -> Vec2 {
        match self {
            OffsetValue::Uniform(v) => Vec2::splat(*v),
            OffsetValue::Vector([x, y]) => Vec2::new(*x, *y),
        }
    }
}

impl From<f32> for OffsetValue {
    fn from(value: f32) -> Self {
        OffsetValue::Uniform(value)
    }
}

impl From<[f32; 2]> for OffsetValue {
    fn from(value: [f32; 2]) -> Self {
        OffsetValue::Vector(value)
    }
}

/// A partial update; absent fields are left untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialParameters {
    pub scale: Option<f32>,
    pub thickness: Option<f32>,
    pub offset: Option<OffsetValue>,
    pub color: Option<Rgb>,
    pub density: Option<f32>,
}

impl PartialParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scale(mut self, scale: f32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn thickness(mut self, thickness: f32) -> Self {
        self.thickness = Some(thickness);
        self
    }

    pub fn offset(mut self, offset: impl Into<OffsetValue>) -> Self {
        self.offset = Some(offset.into());
        self
    }

    pub fn color(mut self, color: Rgb) -> Self {
        self.color = Some(color);
        self
    }

    pub fn density(mut self, density: f32) -> Self {
        self.density = Some(density);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.scale.is_none()
            && self.thickness.is_none()
            && self.offset.is_none()
            && self.color.is_none()
            && self.density.is_none()
    }
}

/// Clamp a scalar; `None` when the input is not finite.
fn clamp_scalar(value: f32, min: f32, max: f32) -> Option<f32> {
    value.is_finite().then(|| value.clamp(min, max))
}

fn wrap_phase(value: f32) -> f32 {
    let wrapped = value - value.floor();
    // `x - floor(x)` can round up to exactly 1.0 for tiny negative inputs.
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}

/// Canonical parameter state for one pattern.
#[derive(Clone, Debug)]
pub struct ParameterStore {
    kind: PatternKind,
    current: PatternParameters,
    revision: u64,
}

impl ParameterStore {
    /// Create a store holding the documented defaults.
    pub fn new(kind: PatternKind) -> Self {
        Self {
            kind,
            current: PatternParameters::defaults(kind),
            revision: 0,
        }
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Current immutable snapshot.
    pub fn get(&self) -> PatternParameters {
        self.current
    }

    /// Number of updates that changed at least one field.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Merge a partial update, clamping each field into range.
    pub fn update(&mut self, partial: &PartialParameters) -> ChangeSet {
        let mut next = self.current;
        let mut adjusted = ChangedFields::NONE;

        if let Some(scale) = partial.scale {
            match clamp_scalar(scale, SCALE_EPSILON, self.kind.max_scale()) {
                Some(v) => {
                    if v != scale {
                        adjusted.scale = true;
                    }
                    next.scale = v;
                }
                None => adjusted.scale = true,
            }
        }

        if let Some(thickness) = partial.thickness {
            match clamp_scalar(thickness, 0.0, MAX_THICKNESS) {
                Some(v) => {
                    if v != thickness {
                        adjusted.thickness = true;
                    }
                    next.thickness = v;
                }
                None => adjusted.thickness = true,
            }
        }

        if let Some(offset) = partial.offset {
            let requested = offset.to_vec2();
            if requested.is_finite() {
                let wrapped = Vec2::new(wrap_phase(requested.x), wrap_phase(requested.y));
                if wrapped != requested {
                    adjusted.offset = true;
                }
                next.offset = wrapped;
            } else {
                adjusted.offset = true;
            }
        }

        if let Some(color) = partial.color {
            let clamped = color.clamped();
            if clamped != color {
                adjusted.color = true;
            }
            if color.is_finite() {
                next.color = clamped;
            } else {
                adjusted.color = true;
            }
        }

        if let Some(density) = partial.density {
            match self.kind {
                PatternKind::Grid => {
                    log::debug!("grid ignores density update ({})", density);
                    adjusted.density = true;
                }
                PatternKind::Cross => match clamp_scalar(density, MIN_DENSITY, MAX_DENSITY) {
                    Some(v) => {
                        if v != density {
                            adjusted.density = true;
                        }
                        next.density = v;
                    }
                    None => adjusted.density = true,
                },
            }
        }

        if !adjusted.is_empty() {
            log::debug!(
                "{} update adjusted fields: {:?}",
                self.kind.label(),
                adjusted.iter().map(|f| f.name()).collect::<Vec<_>>()
            );
        }

        let fields = ChangedFields {
            scale: next.scale != self.current.scale,
            thickness: next.thickness != self.current.thickness,
            offset: next.offset != self.current.offset,
            color: next.color != self.current.color,
            density: next.density != self.current.density,
        };

        let kind = if fields.is_empty() {
            ChangeKind::None
        } else if fields.density {
            // Density always forces cell-size recomputation, even when the
            // floored cell count is unchanged.
            ChangeKind::Structural
        } else {
            ChangeKind::ScalarOnly
        };

        if kind != ChangeKind::None {
            self.current = next;
            self.revision += 1;
        }

        ChangeSet {
            pattern: self.kind,
            fields,
            adjusted,
            kind,
            revision: self.revision,
        }
    }

    /// Restore the documented defaults.
    pub fn reset(&mut self) -> ChangeSet {
        let defaults = PatternParameters::defaults(self.kind);
        let partial = PartialParameters {
            scale: Some(defaults.scale),
            thickness: Some(defaults.thickness),
            offset: Some(OffsetValue::Vector(defaults.offset.to_array())),
            color: Some(defaults.color),
            density: match self.kind {
                PatternKind::Grid => None,
                PatternKind::Cross => Some(defaults.density),
            },
        };
        self.update(&partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let grid = ParameterStore::new(PatternKind::Grid).get();
        assert_eq!(grid.scale, 1.0);
        assert_eq!(grid.thickness, 0.007);
        assert_eq!(grid.color.to_hex(), "#d3d3d3");

        let cross = ParameterStore::new(PatternKind::Cross).get();
        assert_eq!(cross.density, 45.0);
        assert_eq!(cross.cell_count(), 45);
        assert_eq!(cross.color.to_hex(), "#ff5f1f");
        assert_eq!(cross.offset, Vec2::ZERO);
    }

    #[test]
    fn test_empty_update_is_noop() {
        let mut store = ParameterStore::new(PatternKind::Cross);
        let before = store.get();
        let change = store.update(&PartialParameters::new());
        assert!(change.is_empty());
        assert_eq!(change.fields, ChangedFields::NONE);
        assert_eq!(store.get(), before);
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_same_value_is_noop() {
        let mut store = ParameterStore::new(PatternKind::Grid);
        let change = store.update(&PartialParameters::new().thickness(0.007));
        assert_eq!(change.kind, ChangeKind::None);
    }

    #[test]
    fn test_scalar_only_classification() {
        let mut store = ParameterStore::new(PatternKind::Cross);
        let change = store.update(
            &PartialParameters::new()
                .thickness(0.05)
                .scale(0.1)
                .offset(0.25)
                .color(Rgb::WHITE),
        );
        assert_eq!(change.kind, ChangeKind::ScalarOnly);
        assert_eq!(
            change.fields,
            ChangedFields::of(&[
                ParamField::Scale,
                ParamField::Thickness,
                ParamField::Offset,
                ParamField::Color
            ])
        );
        assert_eq!(store.get().offset, Vec2::splat(0.25));
    }

    #[test]
    fn test_density_is_structural() {
        let mut store = ParameterStore::new(PatternKind::Cross);
        let change = store.update(&PartialParameters::new().density(18.0));
        assert!(change.is_structural());
        assert!(change.fields.density);
        assert_eq!(store.get().cell_count(), 18);
    }

    #[test]
    fn test_clamps_instead_of_failing() {
        let mut store = ParameterStore::new(PatternKind::Cross);
        let change = store.update(
            &PartialParameters::new()
                .scale(0.0)
                .thickness(-1.0)
                .density(0.0),
        );
        let params = store.get();
        assert_eq!(params.scale, SCALE_EPSILON);
        assert_eq!(params.thickness, 0.0);
        assert_eq!(params.density, MIN_DENSITY);
        assert!(change.adjusted.scale && change.adjusted.thickness && change.adjusted.density);

        store.update(&PartialParameters::new().density(1e9));
        assert_eq!(store.get().density, MAX_DENSITY);
    }

    #[test]
    fn test_non_finite_keeps_previous_value() {
        let mut store = ParameterStore::new(PatternKind::Grid);
        let change = store.update(&PartialParameters::new().scale(f32::NAN).thickness(f32::INFINITY));
        assert_eq!(change.kind, ChangeKind::None);
        assert!(change.adjusted.scale);
        assert!(change.adjusted.thickness);
        assert_eq!(store.get().scale, 1.0);
    }

    #[test]
    fn test_offset_wraps_into_unit_range() {
        let mut store = ParameterStore::new(PatternKind::Cross);
        let change = store.update(&PartialParameters::new().offset([1.25, -0.25]));
        assert!(change.adjusted.offset);
        let offset = store.get().offset;
        assert!((offset.x - 0.25).abs() < 1e-6);
        assert!((offset.y - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_grid_ignores_density() {
        let mut store = ParameterStore::new(PatternKind::Grid);
        let change = store.update(&PartialParameters::new().density(12.0));
        assert_eq!(change.kind, ChangeKind::None);
        assert!(change.adjusted.density);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut store = ParameterStore::new(PatternKind::Cross);
        store.update(&PartialParameters::new().density(3.0).thickness(0.2));
        let change = store.reset();
        assert!(change.is_structural());
        assert_eq!(store.get(), PatternParameters::defaults(PatternKind::Cross));
    }

    #[test]
    fn test_partial_from_json() {
        let partial: PartialParameters =
            serde_json::from_str(r##"{"scale": 0.022, "offset": 0, "color": "#ff5f1f", "density": 45}"##)
                .unwrap();
        assert_eq!(partial.offset, Some(OffsetValue::Uniform(0.0)));
        assert_eq!(partial.density, Some(45.0));

        let vector: PartialParameters = serde_json::from_str(r#"{"offset": [0.5, 0.25]}"#).unwrap();
        assert_eq!(vector.offset.map(|o| o.to_vec2()), Some(Vec2::new(0.5, 0.25)));

        assert!(serde_json::from_str::<PartialParameters>(r#"{"bogus": 1}"#).is_err());
    }
}

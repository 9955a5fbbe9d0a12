//! The floor aggregate.
//!
//! Owns both parameter stores and both pattern surfaces. Edits go through
//! [`Floor::update`], which updates the store immediately and queues the
//! resulting change on the surface; [`Floor::prepare_frame`] is the per-frame
//! hook that flushes queued work before anything is drawn. Layers are always
//! drawn grid first, cross second.

use crate::backend::PatternBackend;
use crate::color::Rgb;
use crate::compositor::FadeSettings;
use crate::config::FloorConfig;
use crate::error::PatternError;
use crate::lifecycle::{FlushOutcome, PatternSurface};
use crate::params::{ChangeSet, ParameterStore, PartialParameters, PatternKind, PatternParameters};
use crate::strategy::RenderStrategy;
use crate::tessellate::TessellationOptions;

/// Fixed draw order, bottom layer first.
pub const DRAW_ORDER: [PatternKind; 2] = [PatternKind::Grid, PatternKind::Cross];

pub struct PatternLayer<B: PatternBackend> {
    store: ParameterStore,
    surface: PatternSurface<B>,
}

impl<B: PatternBackend> PatternLayer<B> {
    fn new(kind: PatternKind, strategy: RenderStrategy, extent: f32, options: TessellationOptions) -> Self {
        Self {
            store: ParameterStore::new(kind),
            surface: PatternSurface::new(kind, strategy, extent, options),
        }
    }

    pub fn params(&self) -> PatternParameters {
        self.store.get()
    }

    pub fn store(&self) -> &ParameterStore {
        &self.store
    }

    pub fn surface(&self) -> &PatternSurface<B> {
        &self.surface
    }
}

/// What [`Floor::prepare_frame`] did for each layer.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub grid: FlushOutcome,
    pub cross: FlushOutcome,
}

impl FrameReport {
    pub fn outcome(&self, kind: PatternKind) -> &FlushOutcome {
        match kind {
            PatternKind::Grid => &self.grid,
            PatternKind::Cross => &self.cross,
        }
    }
}

pub struct Floor<B: PatternBackend> {
    grid: PatternLayer<B>,
    cross: PatternLayer<B>,
    extent: f32,
    fade: FadeSettings,
    ground_color: Rgb,
    frame: u64,
}

impl<B: PatternBackend> Floor<B> {
    /// Build the floor from configuration. No resources are allocated yet.
    pub fn new(config: &FloorConfig) -> Self {
        let mut grid = PatternLayer::new(
            PatternKind::Grid,
            config.grid.strategy_for(PatternKind::Grid),
            config.extent,
            config.tessellation,
        );
        let mut cross = PatternLayer::new(
            PatternKind::Cross,
            config.cross.strategy_for(PatternKind::Cross),
            config.extent,
            config.tessellation,
        );
        grid.store.update(&config.grid.params);
        cross.store.update(&config.cross.params);

        let fade = if config.fade.is_valid() {
            config.fade
        } else {
            log::warn!("invalid fade {:?}, using the default", config.fade);
            FadeSettings::default()
        };

        Self {
            grid,
            cross,
            extent: config.extent,
            fade,
            ground_color: config.ground_color,
            frame: 0,
        }
    }

    fn layer_mut(&mut self, kind: PatternKind) -> &mut PatternLayer<B> {
        match kind {
            PatternKind::Grid => &mut self.grid,
            PatternKind::Cross => &mut self.cross,
        }
    }

    pub fn layer(&self, kind: PatternKind) -> &PatternLayer<B> {
        match kind {
            PatternKind::Grid => &self.grid,
            PatternKind::Cross => &self.cross,
        }
    }

    pub fn params(&self, kind: PatternKind) -> PatternParameters {
        self.layer(kind).params()
    }

    pub fn surface(&self, kind: PatternKind) -> &PatternSurface<B> {
        &self.layer(kind).surface
    }

    pub fn extent(&self) -> f32 {
        self.extent
    }

    pub fn fade(&self) -> FadeSettings {
        self.fade
    }

    pub fn ground_color(&self) -> Rgb {
        self.ground_color
    }

    /// Frames prepared so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Allocate both layers. A failing layer stays invisible and does not
    /// stop the other one; the first error is returned after both ran.
    pub fn initialize(&mut self, backend: &mut B) -> Result<(), PatternError> {
        let mut first_error = None;
        for kind in DRAW_ORDER {
            let layer = self.layer_mut(kind);
            let params = layer.store.get();
            if let Err(e) = layer.surface.initialize(backend, &params) {
                first_error = first_error.or(Some(e));
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Apply a partial update to one pattern. Resources change at the next
    /// [`Floor::prepare_frame`].
    pub fn update(&mut self, kind: PatternKind, partial: &PartialParameters) -> ChangeSet {
        let layer = self.layer_mut(kind);
        let change = layer.store.update(partial);
        layer.surface.apply(&change);
        change
    }

    pub fn update_grid(&mut self, partial: &PartialParameters) -> ChangeSet {
        self.update(PatternKind::Grid, partial)
    }

    pub fn update_cross(&mut self, partial: &PartialParameters) -> ChangeSet {
        self.update(PatternKind::Cross, partial)
    }

    /// Restore one pattern's defaults.
    pub fn reset(&mut self, kind: PatternKind) -> ChangeSet {
        let layer = self.layer_mut(kind);
        let change = layer.store.reset();
        layer.surface.apply(&change);
        change
    }

    pub fn set_strategy(&mut self, kind: PatternKind, strategy: RenderStrategy) {
        self.layer_mut(kind).surface.set_strategy(strategy);
    }

    pub fn set_tessellation(&mut self, options: TessellationOptions) {
        for kind in DRAW_ORDER {
            self.layer_mut(kind).surface.set_options(options);
        }
    }

    pub fn set_fade(&mut self, fade: FadeSettings) {
        if fade.is_valid() {
            self.fade = fade;
        } else {
            log::warn!("ignoring invalid fade {:?}", fade);
        }
    }

    /// Per-frame hook: flush queued edits into both layers. Must run after
    /// the frame's edits and before its draw.
    pub fn prepare_frame(&mut self, backend: &mut B) -> FrameReport {
        let grid_params = self.grid.store.get();
        let cross_params = self.cross.store.get();
        let grid = self.grid.surface.flush(backend, &grid_params);
        let cross = self.cross.surface.flush(backend, &cross_params);
        self.frame += 1;

        if self.frame == 1 {
            log::info!(
                "first frame: grid {} ({}), cross {} ({}) with {} cells",
                self.grid.surface.state(),
                self.grid.surface.strategy(),
                self.cross.surface.state(),
                self.cross.surface.strategy(),
                cross_params.cell_count()
            );
        }

        FrameReport {
            frame: self.frame,
            grid,
            cross,
        }
    }

    /// Live resource sets in draw order; degraded layers are skipped.
    pub fn visible_layers(&self) -> impl Iterator<Item = (PatternKind, &B::Resources)> + '_ {
        DRAW_ORDER
            .into_iter()
            .filter_map(move |kind| self.surface(kind).resources().map(|r| (kind, r)))
    }

    /// Release everything. Safe to call more than once.
    pub fn dispose(&mut self, backend: &mut B) {
        for kind in DRAW_ORDER {
            self.layer_mut(kind).surface.dispose(backend);
        }
    }
}

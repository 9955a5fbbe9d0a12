//! Pattern material lifecycle.
//!
//! A [`PatternSurface`] owns at most one resource set for one pattern and
//! moves between these states:
//!
//! ```text
//! Uninitialized --initialize--> Live
//! Live --scalar change--> Live            (uniform writes, no allocation)
//! Live --structural change--> Rebuilding --> Live | Degraded
//! Degraded --next change--> Rebuilding --> Live | Degraded
//! Degraded --initialize--> Live | Degraded
//! any --dispose--> Uninitialized          (idempotent)
//! ```
//!
//! Edits are recorded with [`PatternSurface::apply`] and only reach the
//! backend in [`PatternSurface::flush`], once per frame, so any number of
//! edits between two frames coalesce into one write per field or one
//! rebuild. A rebuild always releases the old set before allocating the new
//! one.

use std::fmt;

use crate::backend::{PatternBackend, ResourceRequest};
use crate::error::PatternError;
use crate::gpu::pattern_pipeline::PatternUniforms;
use crate::params::{ChangeSet, ChangedFields, PatternKind, PatternParameters};
use crate::strategy::RenderStrategy;
use crate::tessellate::TessellationOptions;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialState {
    Uninitialized,
    Live,
    Rebuilding,
    /// Allocation failed; nothing is drawn until the next successful rebuild.
    Degraded,
}

impl MaterialState {
    pub fn label(&self) -> &'static str {
        match self {
            MaterialState::Uninitialized => "uninitialized",
            MaterialState::Live => "live",
            MaterialState::Rebuilding => "rebuilding",
            MaterialState::Degraded => "degraded",
        }
    }
}

impl fmt::Display for MaterialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Resource counters for one surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceStats {
    pub allocations: u64,
    pub releases: u64,
    pub rebuilds: u64,
    pub uniform_writes: u64,
    pub failures: u64,
}

impl ResourceStats {
    /// Resource sets currently held (0 or 1).
    pub fn live(&self) -> u64 {
        self.allocations - self.releases
    }
}

/// What one [`PatternSurface::flush`] did.
#[derive(Clone, Debug, PartialEq)]
pub enum FlushOutcome {
    Idle,
    UniformsWritten(usize),
    Rebuilt,
    Failed(PatternError),
}

pub struct PatternSurface<B: PatternBackend> {
    kind: PatternKind,
    strategy: RenderStrategy,
    extent: f32,
    options: TessellationOptions,
    state: MaterialState,
    resources: Option<B::Resources>,
    pending: ChangedFields,
    pending_rebuild: bool,
    stats: ResourceStats,
}

impl<B: PatternBackend> PatternSurface<B> {
    pub fn new(
        kind: PatternKind,
        strategy: RenderStrategy,
        extent: f32,
        options: TessellationOptions,
    ) -> Self {
        Self {
            kind,
            strategy,
            extent,
            options,
            state: MaterialState::Uninitialized,
            resources: None,
            pending: ChangedFields::NONE,
            pending_rebuild: false,
            stats: ResourceStats::default(),
        }
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn strategy(&self) -> RenderStrategy {
        self.strategy
    }

    pub fn state(&self) -> MaterialState {
        self.state
    }

    pub fn stats(&self) -> ResourceStats {
        self.stats
    }

    pub fn extent(&self) -> f32 {
        self.extent
    }

    pub fn options(&self) -> &TessellationOptions {
        &self.options
    }

    /// The live resource set, if the pattern is visible.
    pub fn resources(&self) -> Option<&B::Resources> {
        self.resources.as_ref()
    }

    /// The live resource set, or why there is none.
    pub fn live_resources(&self) -> Result<&B::Resources, PatternError> {
        self.resources
            .as_ref()
            .ok_or_else(|| PatternError::NotInitialized(format!("{} ({})", self.label(), self.state)))
    }

    /// Work is waiting for the next flush.
    pub fn has_pending(&self) -> bool {
        self.pending_rebuild || !self.pending.is_empty()
    }

    fn label(&self) -> String {
        format!("{} pattern ({})", self.kind.label(), self.strategy.label())
    }

    /// Allocate the first resource set. A degraded surface retries the build.
    pub fn initialize(
        &mut self,
        backend: &mut B,
        params: &PatternParameters,
    ) -> Result<(), PatternError> {
        match self.state {
            MaterialState::Live | MaterialState::Rebuilding => {
                log::warn!("{} is already initialized ({})", self.label(), self.state);
                Ok(())
            }
            MaterialState::Uninitialized => self.build(backend, params),
            MaterialState::Degraded => {
                log::info!("{} retrying after a failed build", self.label());
                self.build(backend, params)
            }
        }
    }

    /// Record a parameter change for the next flush.
    pub fn apply(&mut self, change: &ChangeSet) {
        if change.pattern != self.kind {
            log::warn!(
                "{} change ignored by {} surface",
                change.pattern.label(),
                self.kind.label()
            );
            return;
        }
        if change.is_empty() {
            return;
        }
        self.pending = self.pending.union(&change.fields);
        if change.is_structural() || self.strategy.requires_rebuild(self.kind, &change.fields) {
            self.pending_rebuild = true;
        }
    }

    /// Switch strategy; takes effect at the next flush.
    pub fn set_strategy(&mut self, strategy: RenderStrategy) {
        if strategy != self.strategy {
            log::info!(
                "{} pattern strategy {} -> {}",
                self.kind.label(),
                self.strategy,
                strategy
            );
            self.strategy = strategy;
            self.pending_rebuild = true;
        }
    }

    /// Replace tessellation options; takes effect at the next flush.
    pub fn set_options(&mut self, options: TessellationOptions) {
        if options != self.options {
            self.options = options;
            if self.strategy == RenderStrategy::CpuTessellatedLines {
                self.pending_rebuild = true;
            }
        }
    }

    /// Push pending work to the backend. Call once per frame, before drawing.
    pub fn flush(&mut self, backend: &mut B, params: &PatternParameters) -> FlushOutcome {
        if !self.has_pending() {
            return FlushOutcome::Idle;
        }
        match self.state {
            MaterialState::Uninitialized => {
                // Parameters are read in full on initialization.
                self.clear_pending();
                FlushOutcome::Idle
            }
            MaterialState::Live if !self.pending_rebuild => {
                let written = self.write_uniforms(backend, params);
                self.clear_pending();
                FlushOutcome::UniformsWritten(written)
            }
            MaterialState::Live | MaterialState::Degraded | MaterialState::Rebuilding => {
                match self.rebuild(backend, params) {
                    Ok(()) => FlushOutcome::Rebuilt,
                    Err(e) => FlushOutcome::Failed(e),
                }
            }
        }
    }

    /// Release the live set, if any. Safe to call repeatedly.
    pub fn dispose(&mut self, backend: &mut B) {
        if let Some(resources) = self.resources.take() {
            backend.release(resources);
            self.stats.releases += 1;
            log::info!("{} disposed", self.label());
        }
        self.clear_pending();
        self.state = MaterialState::Uninitialized;
    }

    fn clear_pending(&mut self) {
        self.pending = ChangedFields::NONE;
        self.pending_rebuild = false;
    }

    fn write_uniforms(&mut self, backend: &mut B, params: &PatternParameters) -> usize {
        let Some(resources) = self.resources.as_ref() else {
            return 0;
        };
        let uniforms = PatternUniforms::new(params, self.extent);
        let bytes = bytemuck::bytes_of(&uniforms);
        let mut written = 0;
        for field in self.pending.iter() {
            let slot = PatternUniforms::slot(field);
            backend.write_uniform(resources, slot.start as u64, &bytes[slot]);
            written += 1;
        }
        self.stats.uniform_writes += written as u64;
        log::debug!("{} wrote {} uniform slot(s)", self.label(), written);
        written
    }

    fn rebuild(&mut self, backend: &mut B, params: &PatternParameters) -> Result<(), PatternError> {
        self.state = MaterialState::Rebuilding;
        if let Some(old) = self.resources.take() {
            backend.release(old);
            self.stats.releases += 1;
        }
        self.stats.rebuilds += 1;
        self.build(backend, params)
    }

    fn build(&mut self, backend: &mut B, params: &PatternParameters) -> Result<(), PatternError> {
        self.clear_pending();
        let label = self.label();
        let result = self
            .strategy
            .build_geometry(self.kind, params, &self.options, self.extent)
            .and_then(|geometry| {
                let uniforms = PatternUniforms::new(params, self.extent);
                backend.allocate(&ResourceRequest {
                    label: &label,
                    kind: self.kind,
                    strategy: self.strategy,
                    uniforms: &uniforms,
                    geometry: &geometry,
                })
            });

        match result {
            Ok(resources) => {
                self.resources = Some(resources);
                self.stats.allocations += 1;
                self.state = MaterialState::Live;
                log::info!("{} live", label);
                Ok(())
            }
            Err(e) => {
                self.stats.failures += 1;
                self.state = MaterialState::Degraded;
                log::error!("{} failed to build, hiding it: {}", label, e);
                Err(e)
            }
        }
    }
}

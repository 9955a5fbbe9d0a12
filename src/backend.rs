//! The seam between the lifecycle manager and the GPU.
//!
//! A [`PatternBackend`] turns a [`ResourceRequest`] into one resource set
//! (program, uniform block, geometry buffers), writes uniform bytes into a
//! live set, and releases a set. Resource handles are moved into
//! [`PatternBackend::release`], so a set can never be released twice.
//!
//! [`RecordingBackend`] implements the trait without a GPU. It tracks every
//! live set and keeps a copy of its uniform bytes, which makes leak and
//! coalescing behaviour observable in tests and in the `inspect` command.

use std::collections::BTreeMap;

use crate::error::PatternError;
use crate::gpu::pattern_pipeline::PatternUniforms;
use crate::params::PatternKind;
use crate::strategy::{RenderStrategy, StrategyGeometry};

/// Everything needed to allocate one pattern's resources.
#[derive(Clone, Copy, Debug)]
pub struct ResourceRequest<'a> {
    pub label: &'a str,
    pub kind: PatternKind,
    pub strategy: RenderStrategy,
    pub uniforms: &'a PatternUniforms,
    pub geometry: &'a StrategyGeometry,
}

pub trait PatternBackend {
    /// One exclusively owned resource set.
    type Resources;

    fn allocate(&mut self, request: &ResourceRequest<'_>) -> Result<Self::Resources, PatternError>;

    /// Write `bytes` into the set's uniform block at `offset`.
    fn write_uniform(&mut self, resources: &Self::Resources, offset: u64, bytes: &[u8]);

    fn release(&mut self, resources: Self::Resources);
}

/// Handle to a set allocated by [`RecordingBackend`].
#[derive(Debug, PartialEq, Eq)]
pub struct RecordedHandle {
    id: u64,
}

impl RecordedHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// What the recording backend knows about one live set.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedSet {
    pub label: String,
    pub kind: PatternKind,
    pub strategy: RenderStrategy,
    pub uniforms: Vec<u8>,
    pub geometry_bytes: u64,
    pub vertex_count: usize,
    pub instance_count: usize,
}

/// GPU-free backend that counts allocations and mirrors uniform writes.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    next_id: u64,
    live: BTreeMap<u64, RecordedSet>,
    allocations: u64,
    releases: u64,
    uniform_writes: u64,
    failures_pending: u32,
    geometry_limit: Option<u64>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse sets whose geometry exceeds `bytes`, like a device buffer limit.
    pub fn with_geometry_limit(mut self, bytes: u64) -> Self {
        self.geometry_limit = Some(bytes);
        self
    }

    /// Make the next `count` allocations fail.
    pub fn fail_next_allocations(&mut self, count: u32) {
        self.failures_pending = count;
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn live_for(&self, kind: PatternKind) -> usize {
        self.live.values().filter(|set| set.kind == kind).count()
    }

    pub fn live_sets(&self) -> impl Iterator<Item = &RecordedSet> {
        self.live.values()
    }

    pub fn get(&self, handle: &RecordedHandle) -> Option<&RecordedSet> {
        self.live.get(&handle.id)
    }

    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    pub fn releases(&self) -> u64 {
        self.releases
    }

    pub fn uniform_writes(&self) -> u64 {
        self.uniform_writes
    }
}

impl PatternBackend for RecordingBackend {
    type Resources = RecordedHandle;

    fn allocate(&mut self, request: &ResourceRequest<'_>) -> Result<RecordedHandle, PatternError> {
        if self.failures_pending > 0 {
            self.failures_pending -= 1;
            return Err(PatternError::Allocation {
                label: request.label.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        let geometry_bytes = request.geometry.byte_len();
        if let Some(limit) = self.geometry_limit {
            if geometry_bytes > limit {
                return Err(PatternError::Allocation {
                    label: request.label.to_string(),
                    reason: format!("geometry of {} bytes exceeds limit of {}", geometry_bytes, limit),
                });
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.allocations += 1;
        self.live.insert(
            id,
            RecordedSet {
                label: request.label.to_string(),
                kind: request.kind,
                strategy: request.strategy,
                uniforms: bytemuck::bytes_of(request.uniforms).to_vec(),
                geometry_bytes,
                vertex_count: request.geometry.vertex_count(),
                instance_count: request.geometry.instance_count(),
            },
        );
        Ok(RecordedHandle { id })
    }

    fn write_uniform(&mut self, resources: &RecordedHandle, offset: u64, bytes: &[u8]) {
        let Some(set) = self.live.get_mut(&resources.id) else {
            log::error!("uniform write to released set {}", resources.id);
            return;
        };
        let start = offset as usize;
        let end = start + bytes.len();
        if end > set.uniforms.len() {
            log::error!(
                "uniform write for '{}' exceeds buffer size ({} > {})",
                set.label,
                end,
                set.uniforms.len()
            );
            return;
        }
        set.uniforms[start..end].copy_from_slice(bytes);
        self.uniform_writes += 1;
    }

    fn release(&mut self, resources: RecordedHandle) {
        if self.live.remove(&resources.id).is_some() {
            self.releases += 1;
        } else {
            log::warn!("release of unknown set {}", resources.id);
        }
    }
}

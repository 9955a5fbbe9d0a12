//! GPU resources for pattern layers.
//!
//! [`WgpuBackend`] implements [`PatternBackend`] on a wgpu device. Each
//! allocation creates a complete, exclusively owned resource set: the shader
//! program and pipeline for the pattern/strategy pair, a uniform buffer with
//! its bind group, and the strategy's geometry buffers. Releasing a set
//! destroys its buffers immediately instead of waiting for the last handle to
//! drop.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::backend::{PatternBackend, ResourceRequest};
use crate::error::PatternError;
use crate::gpu::mesh::create_surface_quad;
use crate::gpu::pipeline::{create_ground_pipeline, create_line_pipeline, create_surface_pipeline};
use crate::params::{ParamField, PatternKind, PatternParameters};
use crate::strategy::{RenderStrategy, StrategyGeometry};

/// Per-pattern uniform block.
///
/// Total size: 48 bytes (16-byte aligned).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct PatternUniforms {
    pub color: [f32; 4],   // 16 bytes (rgb, a = 1.0)
    pub offset: [f32; 2],  // 8 bytes
    pub scale: f32,        // 4 bytes
    pub thickness: f32,    // 4 bytes
    pub density: f32,      // 4 bytes (continuous; floored in the shader)
    pub extent: f32,       // 4 bytes
    pub _padding: [f32; 2], // 8 bytes
}

impl PatternUniforms {
    pub fn new(params: &PatternParameters, extent: f32) -> Self {
        Self {
            color: params.color.to_array4(1.0),
            offset: params.offset.to_array(),
            scale: params.scale,
            thickness: params.thickness,
            density: params.density,
            extent,
            _padding: [0.0; 2],
        }
    }

    /// Byte range of the slot bound to `field`.
    pub fn slot(field: ParamField) -> std::ops::Range<usize> {
        let (start, len) = match field {
            ParamField::Color => (std::mem::offset_of!(PatternUniforms, color), 16),
            ParamField::Offset => (std::mem::offset_of!(PatternUniforms, offset), 8),
            ParamField::Scale => (std::mem::offset_of!(PatternUniforms, scale), 4),
            ParamField::Thickness => (std::mem::offset_of!(PatternUniforms, thickness), 4),
            ParamField::Density => (std::mem::offset_of!(PatternUniforms, density), 4),
        };
        start..start + len
    }
}

/// Uniforms shared by every layer in a frame.
///
/// Total size: 112 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view_proj: [[f32; 4]; 4],    // 64 bytes
    pub camera_position: [f32; 4],   // 16 bytes (xyz, w unused)
    pub ground_color: [f32; 4],      // 16 bytes
    pub fade: [f32; 4],              // 16 bytes (near, far, unused, unused)
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            view_proj: glam::Mat4::IDENTITY.to_cols_array_2d(),
            camera_position: [0.0; 4],
            ground_color: [0.0, 0.0, 0.0, 1.0],
            fade: [
                crate::compositor::DEFAULT_FADE_NEAR,
                crate::compositor::DEFAULT_FADE_FAR,
                0.0,
                0.0,
            ],
        }
    }
}

/// How a resource set is drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawCall {
    Indexed { indices: u32, instances: u32 },
    Lines { vertices: u32 },
    Empty,
}

/// One pattern's GPU resource set.
pub struct WgpuPatternResources {
    label: String,
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
    instance_buffer: Option<wgpu::Buffer>,
    draw: DrawCall,
}

impl WgpuPatternResources {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn draw_call(&self) -> DrawCall {
        self.draw
    }

    /// Record this layer into a pass whose frame bind group (group 0) is set.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        let Some(vertex_buffer) = &self.vertex_buffer else {
            return;
        };
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(1, &self.bind_group, &[]);
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        match self.draw {
            DrawCall::Indexed { indices, instances } => {
                if let Some(instance_buffer) = &self.instance_buffer {
                    pass.set_vertex_buffer(1, instance_buffer.slice(..));
                }
                if let Some(index_buffer) = &self.index_buffer {
                    pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                    pass.draw_indexed(0..indices, 0, 0..instances);
                }
            }
            DrawCall::Lines { vertices } => pass.draw(0..vertices, 0..1),
            DrawCall::Empty => {}
        }
    }

    fn destroy(self) {
        self.uniform_buffer.destroy();
        destroy_buffers([self.vertex_buffer, self.index_buffer, self.instance_buffer]);
    }
}

fn destroy_buffers(buffers: impl IntoIterator<Item = Option<wgpu::Buffer>>) {
    for buffer in buffers.into_iter().flatten() {
        buffer.destroy();
    }
}

/// Errors outside any error scope are logged instead of panicking.
fn install_device_error_handlers(device: &wgpu::Device) {
    device.on_uncaptured_error(Box::new(|error| {
        log::error!("wgpu uncaptured error: {}", error);
    }));
    device.set_device_lost_callback(|reason, message| {
        log::error!("wgpu device lost: reason={:?}, message={}", reason, message);
    });
}

/// Turn the first error caught by an allocation's error scopes into an
/// allocation failure for `label`.
fn scope_result(label: &str, errors: [Option<wgpu::Error>; 2]) -> Result<(), PatternError> {
    match errors.into_iter().flatten().next() {
        None => Ok(()),
        Some(error) => Err(PatternError::Allocation {
            label: label.to_string(),
            reason: error.to_string(),
        }),
    }
}

/// Ground plane drawn beneath every pattern layer.
struct GroundResources {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

/// wgpu implementation of [`PatternBackend`], plus the shared frame state.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    pattern_layout: wgpu::PipelineLayout,
    pattern_bind_group_layout: wgpu::BindGroupLayout,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    ground: GroundResources,
}

impl WgpuBackend {
    /// `extent` sizes the ground plane.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        format: wgpu::TextureFormat,
        extent: f32,
    ) -> Self {
        install_device_error_handlers(&device);

        let frame_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Frame Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<FrameUniforms>() as u64,
                        ),
                    },
                    count: None,
                }],
            });

        let pattern_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Pattern Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<PatternUniforms>() as u64,
                        ),
                    },
                    count: None,
                }],
            });

        let frame_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Frame Uniform Buffer"),
            contents: bytemuck::cast_slice(&[FrameUniforms::default()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: &frame_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });

        let pattern_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Pattern Pipeline Layout"),
            bind_group_layouts: &[&frame_bind_group_layout, &pattern_bind_group_layout],
            push_constant_ranges: &[],
        });

        let ground_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Ground Pipeline Layout"),
            bind_group_layouts: &[&frame_bind_group_layout],
            push_constant_ranges: &[],
        });

        let (vertices, indices) = create_surface_quad(extent);
        let ground = GroundResources {
            pipeline: create_ground_pipeline(&device, &ground_layout, format),
            vertex_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Ground Vertex Buffer"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            index_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Ground Index Buffer"),
                contents: bytemuck::cast_slice(&indices),
                usage: wgpu::BufferUsages::INDEX,
            }),
            index_count: indices.len() as u32,
        };

        Self {
            device,
            queue,
            format,
            pattern_layout,
            pattern_bind_group_layout,
            frame_buffer,
            frame_bind_group,
            ground,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn write_frame(&self, uniforms: &FrameUniforms) {
        self.queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::cast_slice(&[*uniforms]));
    }

    pub fn frame_bind_group(&self) -> &wgpu::BindGroup {
        &self.frame_bind_group
    }

    /// Record the ground plane; sets the frame bind group.
    pub fn draw_ground(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_pipeline(&self.ground.pipeline);
        pass.set_bind_group(0, &self.frame_bind_group, &[]);
        pass.set_vertex_buffer(0, self.ground.vertex_buffer.slice(..));
        pass.set_index_buffer(self.ground.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..self.ground.index_count, 0, 0..1);
    }

    fn load_shader(&self, strategy: RenderStrategy) -> wgpu::ShaderModule {
        let (label, source) = match strategy {
            RenderStrategy::CpuTessellatedLines => {
                ("Pattern Lines Shader", include_str!("shader_lines.wgsl"))
            }
            RenderStrategy::AnalyticShaded | RenderStrategy::HybridMeshNode => {
                ("Pattern Surface Shader", include_str!("shader_pattern.wgsl"))
            }
        };
        self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    }

    fn create_geometry_buffer(
        &self,
        label: &str,
        bytes: &[u8],
        usage: wgpu::BufferUsages,
    ) -> Result<Option<wgpu::Buffer>, PatternError> {
        if bytes.is_empty() {
            return Ok(None);
        }
        let limit = self.device.limits().max_buffer_size;
        if bytes.len() as u64 > limit {
            return Err(PatternError::Allocation {
                label: label.to_string(),
                reason: format!("{} bytes exceeds max buffer size {}", bytes.len(), limit),
            });
        }
        Ok(Some(self.device.create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytes,
                usage,
            },
        )))
    }
}

impl WgpuBackend {
    fn build_resources(
        &self,
        request: &ResourceRequest<'_>,
    ) -> Result<WgpuPatternResources, PatternError> {
        let label = request.label;
        let geometry = request.geometry;

        // Buffers first: a limit failure must not leave a half-built set.
        let vertex_buffer = self.create_geometry_buffer(
            &format!("{} Vertex Buffer", label),
            geometry.vertex_bytes(),
            wgpu::BufferUsages::VERTEX,
        )?;
        let index_buffer = match self.create_geometry_buffer(
            &format!("{} Index Buffer", label),
            geometry.index_bytes(),
            wgpu::BufferUsages::INDEX,
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                destroy_buffers([vertex_buffer]);
                return Err(e);
            }
        };
        let instance_buffer = match self.create_geometry_buffer(
            &format!("{} Instance Buffer", label),
            geometry.instance_bytes(),
            wgpu::BufferUsages::VERTEX,
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                destroy_buffers([vertex_buffer, index_buffer]);
                return Err(e);
            }
        };

        let uniform_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Uniform Buffer", label)),
            contents: bytemuck::cast_slice(&[*request.uniforms]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Bind Group", label)),
            layout: &self.pattern_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let shader = self.load_shader(request.strategy);
        let fragment_entry = match request.kind {
            PatternKind::Grid => "fs_grid",
            PatternKind::Cross => "fs_cross",
        };
        let pipeline = match request.strategy {
            RenderStrategy::AnalyticShaded => create_surface_pipeline(
                &self.device,
                &self.pattern_layout,
                self.format,
                &shader,
                fragment_entry,
                false,
            ),
            RenderStrategy::HybridMeshNode => create_surface_pipeline(
                &self.device,
                &self.pattern_layout,
                self.format,
                &shader,
                fragment_entry,
                true,
            ),
            RenderStrategy::CpuTessellatedLines => {
                create_line_pipeline(&self.device, &self.pattern_layout, self.format, &shader)
            }
        };

        let draw = match geometry {
            _ if geometry.is_empty() => DrawCall::Empty,
            StrategyGeometry::Lines { vertices } => DrawCall::Lines {
                vertices: vertices.len() as u32,
            },
            StrategyGeometry::Surface { indices, .. } => DrawCall::Indexed {
                indices: indices.len() as u32,
                instances: 1,
            },
            StrategyGeometry::Cells {
                indices, instances, ..
            } => DrawCall::Indexed {
                indices: indices.len() as u32,
                instances: instances.len() as u32,
            },
        };

        log::debug!(
            "allocated '{}' ({}, {} geometry bytes)",
            label,
            request.strategy,
            geometry.byte_len()
        );

        Ok(WgpuPatternResources {
            label: label.to_string(),
            pipeline,
            uniform_buffer,
            bind_group,
            vertex_buffer,
            index_buffer,
            instance_buffer,
            draw,
        })
    }
}

impl PatternBackend for WgpuBackend {
    type Resources = WgpuPatternResources;

    /// Device failures (out of memory, validation) while building the set
    /// are caught by error scopes and returned as [`PatternError::Allocation`].
    fn allocate(
        &mut self,
        request: &ResourceRequest<'_>,
    ) -> Result<WgpuPatternResources, PatternError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let built = self.build_resources(request);
        // Innermost scope first.
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        let resources = built?;
        match scope_result(request.label, [out_of_memory, validation]) {
            Ok(()) => Ok(resources),
            Err(e) => {
                resources.destroy();
                Err(e)
            }
        }
    }

    fn write_uniform(&mut self, resources: &WgpuPatternResources, offset: u64, bytes: &[u8]) {
        let end = offset + bytes.len() as u64;
        if end > resources.uniform_buffer.size() {
            log::error!(
                "Pattern uniform data for '{}' exceeds buffer size ({} > {})",
                resources.label,
                end,
                resources.uniform_buffer.size()
            );
            return;
        }
        self.queue.write_buffer(&resources.uniform_buffer, offset, bytes);
    }

    fn release(&mut self, resources: WgpuPatternResources) {
        log::debug!("released '{}'", resources.label);
        resources.destroy();
    }
}

//! Headless floor renderer: draws the ground and every live pattern layer
//! into an offscreen texture and reads the pixels back.

use anyhow::{Context, Result};

use crate::backend::PatternBackend;
use crate::color::Rgb;
use crate::floor::{Floor, FrameReport};
use crate::gpu::pattern_pipeline::{FrameUniforms, WgpuBackend};
use crate::view::CameraView;

/// Linear target so pixel values match the CPU preview's blending.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Bytes per readback row for an RGBA8 target, padded to the copy alignment.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let unpadded = 4 * width;
    unpadded + (align - unpadded % align) % align
}

/// Build the per-frame uniforms for a floor seen through `view`.
pub fn frame_uniforms<B: PatternBackend>(
    floor: &Floor<B>,
    view: &CameraView,
    aspect: f32,
) -> FrameUniforms {
    let fade = floor.fade();
    FrameUniforms {
        view_proj: view.view_proj(aspect).to_cols_array_2d(),
        camera_position: view.eye.extend(1.0).to_array(),
        ground_color: floor.ground_color().to_array4(1.0),
        fade: [fade.near, fade.far, 0.0, 0.0],
    }
}

pub struct FloorRenderer {
    backend: WgpuBackend,
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
    texture: wgpu::Texture,
    texture_view: wgpu::TextureView,
    output_buffer: wgpu::Buffer,
}

impl FloorRenderer {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, extent: f32, width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Floor Target Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let padded_bytes_per_row = padded_bytes_per_row(width);

        let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Floor Readback Buffer"),
            size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            backend: WgpuBackend::new(device, queue, TARGET_FORMAT, extent),
            width,
            height,
            padded_bytes_per_row,
            texture,
            texture_view,
            output_buffer,
        }
    }

    pub fn backend(&self) -> &WgpuBackend {
        &self.backend
    }

    /// The backend the floor allocates from; pass it to
    /// [`Floor::initialize`] and [`Floor::dispose`].
    pub fn backend_mut(&mut self) -> &mut WgpuBackend {
        &mut self.backend
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Flush pending edits, draw one frame and return it as tightly packed
    /// RGBA8 rows, top to bottom.
    pub fn render(
        &mut self,
        floor: &mut Floor<WgpuBackend>,
        view: &CameraView,
        background: Rgb,
    ) -> Result<(FrameReport, Vec<u8>)> {
        let report = floor.prepare_frame(&mut self.backend);
        let aspect = self.width as f32 / self.height as f32;
        self.backend.write_frame(&frame_uniforms(floor, view, aspect));

        let device = self.backend.device();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Floor Encoder"),
        });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Floor Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.texture_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: background.r as f64,
                            g: background.g as f64,
                            b: background.b as f64,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.backend.draw_ground(&mut render_pass);
            for (_, resources) in floor.visible_layers() {
                resources.draw(&mut render_pass);
            }
        }

        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        self.backend.queue().submit(Some(encoder.finish()));

        let pixels = self.read_back()?;
        Ok((report, pixels))
    }

    fn read_back(&self) -> Result<Vec<u8>> {
        let buffer_slice = self.output_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        self.backend.device().poll(wgpu::Maintain::Wait);
        rx.recv()
            .context("readback callback never ran")?
            .context("failed to map readback buffer")?;

        let data = buffer_slice.get_mapped_range();
        let row_bytes = (self.width * 4) as usize;
        let mut pixels = Vec::with_capacity(row_bytes * self.height as usize);
        for row in 0..self.height {
            let start = (row * self.padded_bytes_per_row) as usize;
            pixels.extend_from_slice(&data[start..start + row_bytes]);
        }
        drop(data);
        self.output_buffer.unmap();
        Ok(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_padding() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(800), 3328);
    }

    #[test]
    fn test_frame_uniforms_carry_fade_and_camera() {
        use crate::backend::RecordingBackend;
        use crate::compositor::FadeSettings;
        use crate::config::FloorConfig;

        let mut floor: Floor<RecordingBackend> = Floor::new(&FloorConfig::default());
        floor.set_fade(FadeSettings::new(12.0, 30.0));
        let view = CameraView::default();
        let uniforms = frame_uniforms(&floor, &view, 4.0 / 3.0);
        assert_eq!(uniforms.fade, [12.0, 30.0, 0.0, 0.0]);
        assert_eq!(uniforms.camera_position, [10.0, 10.0, 10.0, 1.0]);
        assert_eq!(uniforms.view_proj, view.view_proj(4.0 / 3.0).to_cols_array_2d());
    }
}

use bytemuck::{Pod, Zeroable};

/// Height of tessellated line geometry above the ground plane.
pub const LINE_LIFT: f32 = 0.002;

/// Vertex of a pattern surface quad.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SurfaceVertex {
    pub position: [f32; 3],
    /// Surface-local coordinate (origin at the surface centre).
    pub local: [f32; 2],
}

impl SurfaceVertex {
    pub const fn new(position: [f32; 3], local: [f32; 2]) -> Self {
        Self { position, local }
    }

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SurfaceVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 12, // [f32; 3] is 12 bytes
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Endpoint of one tessellated line segment.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
}

impl LineVertex {
    /// Vertex on the lifted line plane at surface-local `(x, z)`.
    pub const fn on_surface(x: f32, z: f32) -> Self {
        Self {
            position: [x, LINE_LIFT, z],
        }
    }

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LineVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            }],
        }
    }
}

/// One mesh node of the hybrid strategy: a square tile of the surface.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct CellInstance {
    /// Tile centre, surface-local.
    pub center: [f32; 2],
    /// Tile side length.
    pub size: f32,
    pub _padding: f32,
}

impl CellInstance {
    pub fn new(center: [f32; 2], size: f32) -> Self {
        Self {
            center,
            size,
            _padding: 0.0,
        }
    }

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<CellInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: 8, // [f32; 2] is 8 bytes
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32,
                },
            ],
        }
    }
}

/// Square quad of side `extent` in the XZ plane (Y up), centred at origin.
pub fn create_surface_quad(extent: f32) -> (Vec<SurfaceVertex>, Vec<u16>) {
    let h = extent * 0.5;
    let vertices = vec![
        SurfaceVertex::new([-h, 0.0, -h], [-h, -h]),
        SurfaceVertex::new([h, 0.0, -h], [h, -h]),
        SurfaceVertex::new([h, 0.0, h], [h, h]),
        SurfaceVertex::new([-h, 0.0, h], [-h, h]),
    ];

    let indices = vec![
        0, 2, 1, 2, 0, 3, // Top face (counter-clockwise seen from +Y)
    ];

    (vertices, indices)
}

/// Unit quad in the XZ plane, scaled and placed per [`CellInstance`].
pub fn create_unit_cell() -> (Vec<SurfaceVertex>, Vec<u16>) {
    create_surface_quad(1.0)
}

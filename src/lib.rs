pub mod error;
pub mod color;
pub mod params;
pub mod shading;

// Analytic evaluators and composition
pub mod grid;
pub mod cross;
pub mod compositor;

// Geometry and resource lifecycle
pub mod tessellate;
pub mod strategy;
pub mod backend;
pub mod lifecycle;
pub mod floor;
pub mod gpu;

pub mod view;
pub mod config;
pub mod preview;

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

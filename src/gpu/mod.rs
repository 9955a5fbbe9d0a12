pub mod mesh;
pub mod pipeline;
pub mod pattern_pipeline;
pub mod renderer;

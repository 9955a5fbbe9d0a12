use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::backend::RecordingBackend;
use crate::config::FloorConfig;
use crate::floor::{Floor, DRAW_ORDER};
use crate::gpu::renderer::FloorRenderer;
use crate::lifecycle::FlushOutcome;
use crate::preview::{render_preview, PreviewScene};
use crate::strategy::RenderStrategy;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every command.
#[derive(Args, Clone, Debug)]
struct SceneArgs {
    /// JSON floor configuration (defaults when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the grid render strategy (analytic, lines, hybrid)
    #[arg(long)]
    grid_strategy: Option<RenderStrategy>,

    /// Override the cross render strategy (analytic, lines, hybrid)
    #[arg(long)]
    cross_strategy: Option<RenderStrategy>,

    /// Override the cross density (cells across the surface)
    #[arg(long)]
    cross_density: Option<f32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one frame on the GPU to a PNG
    Render {
        #[command(flatten)]
        scene: SceneArgs,

        /// Output PNG path
        #[arg(long)]
        out: PathBuf,

        /// Output width
        #[arg(long, default_value_t = 800)]
        width: u32,

        /// Output height
        #[arg(long, default_value_t = 600)]
        height: u32,
    },
    /// Render one frame with the CPU reference renderer to a PNG
    Preview {
        #[command(flatten)]
        scene: SceneArgs,

        /// Output PNG path
        #[arg(long)]
        out: PathBuf,

        /// Output width
        #[arg(long, default_value_t = 400)]
        width: u32,

        /// Output height
        #[arg(long, default_value_t = 300)]
        height: u32,
    },
    /// Build both layers without a GPU and report their resources
    Inspect {
        #[command(flatten)]
        scene: SceneArgs,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render { scene, out, width, height } => {
            let config = load_config(&scene)?;
            pollster::block_on(render_offline(&config, &out, width, height))?;
        }
        Commands::Preview { scene, out, width, height } => {
            let config = load_config(&scene)?;
            let pixels = render_preview(
                &PreviewScene::from_config(&config),
                &config.camera.to_view(),
                width,
                height,
            );
            save_png(&out, &pixels, width.max(1), height.max(1))?;
            println!("Wrote {}", out.display());
        }
        Commands::Inspect { scene } => {
            let config = load_config(&scene)?;
            inspect(&config);
        }
    }
    Ok(())
}

fn load_config(args: &SceneArgs) -> Result<FloorConfig> {
    let mut config = match &args.config {
        Some(path) => FloorConfig::from_file(path)?,
        None => FloorConfig::default(),
    };
    if let Some(strategy) = args.grid_strategy {
        config.grid.strategy = Some(strategy);
    }
    if let Some(strategy) = args.cross_strategy {
        config.cross.strategy = Some(strategy);
    }
    if let Some(density) = args.cross_density {
        config.cross.params.density = Some(density);
    }
    Ok(config)
}

fn save_png(path: &Path, pixels: &[u8], width: u32, height: u32) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    image::save_buffer(path, pixels, width, height, image::ColorType::Rgba8)
        .with_context(|| format!("failed to write {}", path.display()))
}

async fn render_offline(config: &FloorConfig, out: &Path, width: u32, height: u32) -> Result<()> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None, // Headless
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| anyhow::anyhow!("No adapter found"))?;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor::default(), None)
        .await?;

    let mut renderer = FloorRenderer::new(device, queue, config.extent, width, height);
    let mut floor = Floor::new(config);
    if let Err(e) = floor.initialize(renderer.backend_mut()) {
        log::warn!("floor initialised with a degraded layer: {}", e);
    }

    let (report, pixels) = renderer.render(&mut floor, &config.camera.to_view(), config.background_color)?;
    for kind in DRAW_ORDER {
        if let FlushOutcome::Failed(e) = report.outcome(kind) {
            log::warn!("{} layer failed to build: {}", kind.label(), e);
        }
    }

    let (width, height) = renderer.size();
    save_png(out, &pixels, width, height)?;
    floor.dispose(renderer.backend_mut());
    println!("Wrote {}", out.display());
    Ok(())
}

fn inspect(config: &FloorConfig) {
    let mut backend = RecordingBackend::new();
    let mut floor = Floor::new(config);
    if let Err(e) = floor.initialize(&mut backend) {
        println!("initialisation error: {}", e);
    }
    floor.prepare_frame(&mut backend);

    for kind in DRAW_ORDER {
        let params = floor.params(kind);
        let surface = floor.surface(kind);
        println!(
            "{:<5} {:<22} {:<12} scale {:.3} thickness {:.3} density {} ({} cells) color {}",
            kind.label(),
            surface.strategy().label(),
            surface.state().label(),
            params.scale,
            params.thickness,
            params.density,
            params.cell_count(),
            params.color.to_hex()
        );
        for set in backend.live_sets().filter(|set| set.kind == kind) {
            println!(
                "      {}: {} vertices, {} instances, {} geometry bytes, {} uniform bytes",
                set.label,
                set.vertex_count,
                set.instance_count,
                set.geometry_bytes,
                set.uniforms.len()
            );
        }
    }

    println!(
        "{} live sets, {} allocations, {} releases",
        backend.live_count(),
        backend.allocations(),
        backend.releases()
    );
    floor.dispose(&mut backend);
}

use std::collections::HashSet;

use floor_patterns::color::Rgb;
use floor_patterns::config::FloorConfig;
use floor_patterns::cross::CrossEvaluator;
use floor_patterns::grid::GridEvaluator;
use floor_patterns::params::{
    ChangeKind, ParameterStore, PartialParameters, PatternKind, PatternParameters,
};
use floor_patterns::preview::{render_preview, PreviewScene};
use floor_patterns::shading::Footprint;
use floor_patterns::strategy::RenderStrategy;
use floor_patterns::tessellate::{
    estimate_cross_vertices, line_bytes, tessellate_crosses, TessellationOptions,
};
use floor_patterns::view::CameraView;
use glam::{Vec2, Vec3};
use pretty_assertions::assert_eq;

const EXTENT: f32 = 10.0;

fn cross_params(partial: PartialParameters) -> PatternParameters {
    let mut store = ParameterStore::new(PatternKind::Cross);
    store.update(&partial);
    store.get()
}

#[test]
fn test_documented_defaults() {
    let grid = ParameterStore::new(PatternKind::Grid).get();
    assert_eq!(grid.scale, 1.0);
    assert_eq!(grid.thickness, 0.007);
    assert_eq!(grid.offset, Vec2::ZERO);
    assert_eq!(grid.color.to_hex(), "#d3d3d3");

    let cross = ParameterStore::new(PatternKind::Cross).get();
    assert_eq!(cross.scale, 0.022);
    assert_eq!(cross.thickness, 0.028);
    assert_eq!(cross.density, 45.0);
    assert_eq!(cross.cell_count(), 45);
    assert_eq!(cross.color.to_hex(), "#ff5f1f");
}

#[test]
fn test_out_of_range_edits_are_clamped() {
    let mut store = ParameterStore::new(PatternKind::Cross);
    let change = store.update(&PartialParameters::new().density(1000.0).thickness(-1.0));
    assert_eq!(change.kind, ChangeKind::Structural);
    assert!(change.adjusted.density);
    assert!(change.adjusted.thickness);
    assert_eq!(store.get().density, 256.0);
    assert_eq!(store.get().thickness, 0.0);

    let change = store.update(&PartialParameters::new().scale(f32::NAN));
    assert_eq!(change.kind, ChangeKind::None);
    assert!(change.adjusted.scale);
    assert_eq!(store.get().scale, 0.022);
}

#[test]
fn test_density_one_is_a_single_centred_cross() {
    let params = cross_params(PartialParameters::new().density(1.0));
    let cross = CrossEvaluator::new(&params, EXTENT);
    let centres: Vec<Vec2> = cross.centers().collect();
    assert_eq!(centres, vec![Vec2::ZERO]);
    assert!(cross.coverage(Vec2::ZERO, &Footprint::Unavailable) > 0.99);
    assert_eq!(cross.coverage(Vec2::new(4.0, 4.0), &Footprint::Unavailable), 0.0);

    let vertices = tessellate_crosses(&params, &TessellationOptions::default(), EXTENT).unwrap();
    let lines = vertices.len() / 2;
    assert!(lines >= 2);
    let mid = |i: usize| {
        (Vec3::from(vertices[2 * i].position) + Vec3::from(vertices[2 * i + 1].position)) * 0.5
    };
    let centroid = (0..lines).map(mid).sum::<Vec3>() / lines as f32;
    assert!(centroid.x.abs() < 1e-4 && centroid.z.abs() < 1e-4);
}

#[test]
fn test_tessellated_vertex_count_grows_with_density() {
    let options = TessellationOptions::default();
    let mut last = 0;
    for density in [1.0, 2.0, 5.0, 18.0, 45.0, 100.0, 256.0] {
        let params = cross_params(PartialParameters::new().density(density));
        let count = estimate_cross_vertices(&params, &options, EXTENT);
        assert!(count > last, "density {} gave {} vertices", density, count);
        last = count;
    }
}

#[test]
fn test_tessellation_is_deterministic() {
    let params = cross_params(PartialParameters::new().density(18.0).offset([0.3, 0.7]));
    let options = TessellationOptions {
        sub_density: 4.0,
        ..TessellationOptions::default()
    };
    let a = tessellate_crosses(&params, &options, EXTENT).unwrap();
    let b = tessellate_crosses(&params, &options, EXTENT).unwrap();
    assert_eq!(line_bytes(&a), line_bytes(&b));
}

#[test]
fn test_grid_lines_stay_thin_at_distance() {
    let store = ParameterStore::new(PatternKind::Grid);
    let grid = GridEvaluator::new(&store.get());
    // A footprint much wider than the line fades it instead of widening it.
    let far = Footprint::new(Vec2::new(0.2, 0.0), Vec2::new(0.0, 0.2));
    let near = Footprint::new(Vec2::new(0.001, 0.0), Vec2::new(0.0, 0.001));
    assert!(grid.coverage(Vec2::ZERO, &far) < grid.coverage(Vec2::ZERO, &near));
    assert!(grid.coverage(Vec2::new(0.3, 0.3), &far) < 0.01);
}

#[test]
fn test_preview_is_deterministic_and_layered() {
    let mut config = FloorConfig::default();
    config.background_color = Rgb::WHITE;
    let scene = PreviewScene::from_config(&config);
    let view = CameraView::new(Vec3::new(0.0, 6.0, 6.0), Vec3::ZERO);

    let a = render_preview(&scene, &view, 48, 32);
    let b = render_preview(&scene, &view, 48, 32);
    assert_eq!(a, b);

    // Something other than ground and background is drawn.
    let ground = scene.ground_color.to_u8();
    let patterned = a
        .chunks_exact(4)
        .filter(|px| px[..3] != ground[..] && px[..3] != [255, 255, 255])
        .count();
    assert!(patterned > 0);
}

#[test]
fn test_default_crosses_are_visible_from_default_camera() {
    let config = FloorConfig::default();
    assert_eq!(
        config.cross.strategy_for(PatternKind::Cross),
        RenderStrategy::CpuTessellatedLines
    );

    let scene = PreviewScene::from_config(&config);
    let vertices = tessellate_crosses(&scene.cross, &config.tessellation, config.extent).unwrap();
    let view = config.camera.to_view();
    let (width, height) = (400.0_f32, 300.0_f32);
    let view_proj = view.view_proj(width / height);

    // Every line is rasterized at least one pixel wide, so distinct pixels
    // hit by the line endpoints bound what reaches the screen from below.
    let mut pixels = HashSet::new();
    for vertex in &vertices {
        let world = Vec3::from(vertex.position);
        assert!(config.fade.factor(view.eye.distance(world)) > 0.5);
        let ndc = view_proj.project_point3(world);
        assert!(ndc.x.abs() < 1.0 && ndc.y.abs() < 1.0, "{:?} is off screen", world);
        let x = ((ndc.x + 1.0) * 0.5 * width) as u32;
        let y = ((1.0 - ndc.y) * 0.5 * height) as u32;
        pixels.insert((x, y));
    }
    let cells = scene.cross.cell_count() as usize;
    assert!(pixels.len() >= cells * cells / 2, "only {} pixels", pixels.len());
}

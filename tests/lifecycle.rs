use floor_patterns::backend::RecordingBackend;
use floor_patterns::config::FloorConfig;
use floor_patterns::error::PatternError;
use floor_patterns::floor::Floor;
use floor_patterns::gpu::pattern_pipeline::PatternUniforms;
use floor_patterns::lifecycle::{FlushOutcome, MaterialState};
use floor_patterns::params::{ChangeKind, ParamField, PartialParameters, PatternKind};
use floor_patterns::strategy::RenderStrategy;
use floor_patterns::tessellate::TessellationOptions;
use pretty_assertions::assert_eq;

/// Both layers analytic, so scalar edits stay uniform writes.
fn live_floor() -> (Floor<RecordingBackend>, RecordingBackend) {
    let mut config = FloorConfig::default();
    config.cross.strategy = Some(RenderStrategy::AnalyticShaded);
    let mut backend = RecordingBackend::new();
    let mut floor = Floor::new(&config);
    floor.initialize(&mut backend).unwrap();
    (floor, backend)
}

fn cross_uniform(floor: &Floor<RecordingBackend>, backend: &RecordingBackend, field: ParamField) -> f32 {
    let handle = floor.surface(PatternKind::Cross).resources().unwrap();
    let set = backend.get(handle).unwrap();
    let slot = PatternUniforms::slot(field);
    f32::from_ne_bytes(<[u8; 4]>::try_from(&set.uniforms[slot]).unwrap())
}

#[test]
fn test_repeated_density_changes_do_not_leak() {
    let (mut floor, mut backend) = live_floor();
    for i in 0..100 {
        floor.update_cross(&PartialParameters::new().density(10.0 + i as f32));
        let report = floor.prepare_frame(&mut backend);
        assert_eq!(report.cross, FlushOutcome::Rebuilt);
        assert_eq!(backend.live_for(PatternKind::Cross), 1);
    }
    assert_eq!(backend.live_count(), 2);
    assert_eq!(backend.allocations(), 102);
    assert_eq!(backend.releases(), 100);
    assert_eq!(floor.surface(PatternKind::Cross).stats().live(), 1);
}

#[test]
fn test_empty_update_is_a_no_op() {
    let (mut floor, mut backend) = live_floor();
    let change = floor.update_cross(&PartialParameters::new());
    assert_eq!(change.kind, ChangeKind::None);
    let report = floor.prepare_frame(&mut backend);
    assert_eq!(report.cross, FlushOutcome::Idle);
    assert_eq!(backend.allocations(), 2);
    assert_eq!(backend.uniform_writes(), 0);
}

#[test]
fn test_scalar_updates_coalesce_into_one_write() {
    let (mut floor, mut backend) = live_floor();
    for i in 0..50 {
        let change = floor.update_cross(&PartialParameters::new().thickness(0.01 + i as f32 * 0.001));
        assert_eq!(change.kind, ChangeKind::ScalarOnly);
    }
    let report = floor.prepare_frame(&mut backend);

    assert_eq!(report.cross, FlushOutcome::UniformsWritten(1));
    assert_eq!(backend.allocations(), 2);
    assert_eq!(backend.uniform_writes(), 1);
    let last = floor.params(PatternKind::Cross).thickness;
    assert_eq!(cross_uniform(&floor, &backend, ParamField::Thickness), last);
}

#[test]
fn test_scalar_fields_write_only_their_slots() {
    let (mut floor, mut backend) = live_floor();
    floor.update_grid(&PartialParameters::new().offset([0.25, 0.5]).thickness(0.02));
    let report = floor.prepare_frame(&mut backend);
    assert_eq!(report.grid, FlushOutcome::UniformsWritten(2));
    assert_eq!(report.cross, FlushOutcome::Idle);
}

#[test]
fn test_strategy_switch_rebuilds_once() {
    let (mut floor, mut backend) = live_floor();
    floor.set_strategy(PatternKind::Cross, RenderStrategy::CpuTessellatedLines);
    assert_eq!(backend.allocations(), 2);

    let report = floor.prepare_frame(&mut backend);
    assert_eq!(report.cross, FlushOutcome::Rebuilt);
    assert_eq!(backend.live_for(PatternKind::Cross), 1);

    let handle = floor.surface(PatternKind::Cross).resources().unwrap();
    let set = backend.get(handle).unwrap();
    assert_eq!(set.strategy, RenderStrategy::CpuTessellatedLines);
    assert!(set.vertex_count > 0);

    // Thickness is geometry for tessellated lines.
    floor.update_cross(&PartialParameters::new().thickness(0.05));
    assert_eq!(floor.prepare_frame(&mut backend).cross, FlushOutcome::Rebuilt);
    assert_eq!(backend.live_for(PatternKind::Cross), 1);
}

#[test]
fn test_failed_build_degrades_then_recovers() {
    let (mut floor, mut backend) = live_floor();
    backend.fail_next_allocations(1);
    floor.update_cross(&PartialParameters::new().density(10.0));
    let report = floor.prepare_frame(&mut backend);

    assert!(matches!(report.cross, FlushOutcome::Failed(PatternError::Allocation { .. })));
    assert_eq!(floor.surface(PatternKind::Cross).state(), MaterialState::Degraded);
    assert_eq!(backend.live_for(PatternKind::Cross), 0);
    let visible: Vec<PatternKind> = floor.visible_layers().map(|(kind, _)| kind).collect();
    assert_eq!(visible, vec![PatternKind::Grid]);
    assert!(floor.surface(PatternKind::Cross).live_resources().is_err());

    // Grid edits keep working while the cross is degraded.
    floor.update_grid(&PartialParameters::new().thickness(0.02));
    assert_eq!(floor.prepare_frame(&mut backend).grid, FlushOutcome::UniformsWritten(1));

    floor.update_cross(&PartialParameters::new().density(12.0));
    assert_eq!(floor.prepare_frame(&mut backend).cross, FlushOutcome::Rebuilt);
    assert_eq!(floor.surface(PatternKind::Cross).state(), MaterialState::Live);
    assert_eq!(backend.live_for(PatternKind::Cross), 1);
}

#[test]
fn test_second_initialize_recovers_failed_layer() {
    let mut backend = RecordingBackend::new();
    backend.fail_next_allocations(1);
    let mut floor: Floor<RecordingBackend> = Floor::new(&FloorConfig::default());
    assert!(floor.initialize(&mut backend).is_err());
    assert_eq!(floor.surface(PatternKind::Grid).state(), MaterialState::Degraded);

    floor.initialize(&mut backend).unwrap();
    assert_eq!(floor.surface(PatternKind::Grid).state(), MaterialState::Live);
    assert_eq!(floor.visible_layers().count(), 2);
    assert_eq!(backend.live_count(), 2);
    // The cross was already live and is not allocated twice.
    assert_eq!(backend.allocations(), 2);
}

#[test]
fn test_geometry_budget_degrades_pattern() {
    let (mut floor, mut backend) = live_floor();
    floor.set_tessellation(TessellationOptions {
        max_line_vertices: 100,
        ..TessellationOptions::default()
    });
    floor.set_strategy(PatternKind::Cross, RenderStrategy::CpuTessellatedLines);
    let report = floor.prepare_frame(&mut backend);

    assert!(matches!(report.cross, FlushOutcome::Failed(PatternError::GeometryBudget { .. })));
    assert_eq!(floor.surface(PatternKind::Cross).state(), MaterialState::Degraded);
    assert_eq!(floor.surface(PatternKind::Grid).state(), MaterialState::Live);
}

#[test]
fn test_device_buffer_limit_degrades_only_the_large_layer() {
    // Room for the grid quad but not for 45x45 tessellated crosses.
    let mut backend = RecordingBackend::new().with_geometry_limit(64 * 1024);
    let mut floor: Floor<RecordingBackend> = Floor::new(&FloorConfig::default());
    let result = floor.initialize(&mut backend);

    assert!(matches!(result, Err(PatternError::Allocation { .. })));
    assert_eq!(floor.surface(PatternKind::Grid).state(), MaterialState::Live);
    assert_eq!(floor.surface(PatternKind::Cross).state(), MaterialState::Degraded);

    // Fewer cells fit, and the next frame brings the cross back.
    floor.update_cross(&PartialParameters::new().density(5.0));
    assert_eq!(floor.prepare_frame(&mut backend).cross, FlushOutcome::Rebuilt);
    assert_eq!(backend.live_for(PatternKind::Cross), 1);
}

#[test]
fn test_dispose_is_idempotent() {
    let (mut floor, mut backend) = live_floor();
    floor.dispose(&mut backend);
    floor.dispose(&mut backend);
    assert_eq!(backend.live_count(), 0);
    assert_eq!(backend.allocations(), backend.releases());
    assert_eq!(floor.surface(PatternKind::Grid).state(), MaterialState::Uninitialized);
}

#[test]
fn test_reinitialize_after_dispose_restores_stored_params() {
    let (mut floor, mut backend) = live_floor();
    floor.update_cross(&PartialParameters::new().scale(0.05));
    floor.prepare_frame(&mut backend);
    floor.dispose(&mut backend);

    floor.initialize(&mut backend).unwrap();
    assert_eq!(backend.live_count(), 2);
    assert_eq!(cross_uniform(&floor, &backend, ParamField::Scale), 0.05);
}

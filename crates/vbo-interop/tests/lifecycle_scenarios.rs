use std::io::Write;

use tempfile::NamedTempFile;
use vbo_interop::sim::{compile, Entry, Resource, SimConfig, SimDevice};
use vbo_interop::{
    DeviceKind, DevicePolicy, ExitStatus, Flow, Float4, InteropConfig, InteropError, KernelSource,
    Lifecycle, Phase, RunMode, SurfaceEvent,
};

const FULL_TEARDOWN: [Resource; 6] = [
    Resource::Queue,
    Resource::Kernel,
    Resource::Program,
    Resource::Context,
    Resource::Memory,
    Resource::Buffer,
];

fn continuous(iterations: u32) -> InteropConfig {
    InteropConfig { iterations, run_mode: RunMode::Continuous, ..Default::default() }
}

#[test]
fn scenario_a_single_launch_zeroes_all_256_elements() {
    let dev = SimDevice::new(SimConfig::default());
    let mut lc = Lifecycle::new(continuous(1), dev.graphics(), dev.compute()).unwrap();
    lc.initialize().unwrap();

    assert_eq!(lc.handle(SurfaceEvent::Redraw), Flow::Continue);
    let data = lc.read_back().unwrap();
    assert_eq!(data.len(), 256);
    assert!(data.iter().all(|v| *v == Float4::ZERO));

    assert_eq!(lc.shutdown(), ExitStatus::Success);
    assert_eq!(dev.releases(), FULL_TEARDOWN);
}

#[test]
fn scenario_b_no_platform_releases_only_the_buffer() {
    let dev = SimDevice::new(SimConfig { platforms: vec![], ..Default::default() });
    let lc = Lifecycle::new(InteropConfig::default(), dev.graphics(), dev.compute()).unwrap();
    let out = lc.run([SurfaceEvent::Redraw]);

    assert_eq!(out.status, ExitStatus::Failure);
    assert!(matches!(out.error, Some(InteropError::NoPlatform)));
    assert_eq!(out.frames, 0);
    assert_eq!(dev.releases(), vec![Resource::Buffer]);
    assert_eq!(dev.live_buffers(), 0);
    let allocations = dev
        .journal()
        .iter()
        .filter(|e| matches!(e, Entry::BufferAllocated { .. }))
        .count();
    assert_eq!(allocations, 1);
}

#[test]
fn scenario_c_build_log_is_surfaced_verbatim() {
    let broken = "__kernel void init_vbo_kernel(__global flot4 *vbo) { vbo[get_global_id(0)] = 0.0f; }";
    let expected_log = compile(broken).unwrap_err();

    let dev = SimDevice::new(SimConfig::default());
    let lc = Lifecycle::new(InteropConfig::default(), dev.graphics(), dev.compute())
        .unwrap()
        .with_kernel_source(KernelSource::from_text(broken));
    let out = lc.run([SurfaceEvent::Redraw]);

    assert_eq!(out.status, ExitStatus::Failure);
    match out.error {
        Some(InteropError::ProgramBuild { log }) => assert_eq!(log, expected_log),
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(dev.releases(), vec![Resource::Queue, Resource::Context, Resource::Buffer]);
    assert_eq!(dev.live_objects(), 0);
}

#[test]
fn once_mode_tears_down_in_reverse_dependency_order() {
    let dev = SimDevice::new(SimConfig::default());
    let cfg = InteropConfig { iterations: 16, ..Default::default() };
    let lc = Lifecycle::new(cfg, dev.graphics(), dev.compute()).unwrap();
    let out = lc.run(std::iter::repeat(SurfaceEvent::Idle));

    assert_eq!(out.status, ExitStatus::Success);
    assert_eq!(out.frames, 1);
    assert_eq!(dev.launches(), 16);
    assert_eq!(dev.releases(), FULL_TEARDOWN);
}

#[test]
fn one_and_eight_thousand_iterations_are_indistinguishable() {
    let contents = |iterations| {
        let dev = SimDevice::new(SimConfig::default());
        let mut lc = Lifecycle::new(continuous(iterations), dev.graphics(), dev.compute()).unwrap();
        lc.initialize().unwrap();
        assert_eq!(lc.handle(SurfaceEvent::Idle), Flow::Continue);
        lc.read_back().unwrap()
    };
    let one = contents(1);
    let many = contents(8000);
    assert_eq!(one, many);
    assert!(one.iter().all(|v| *v == Float4::ZERO));
}

#[test]
fn submission_failure_aborts_remaining_launches_and_closes_bracket() {
    let dev = SimDevice::new(SimConfig { fail_launch_at: Some(3), ..Default::default() });
    let cfg = InteropConfig { iterations: 10, ..Default::default() };
    let lc = Lifecycle::new(cfg, dev.graphics(), dev.compute()).unwrap();
    let out = lc.run([SurfaceEvent::Idle]);

    assert_eq!(out.status, ExitStatus::Failure);
    assert!(matches!(
        out.error,
        Some(InteropError::DispatchSubmission { command: "kernel", launch: Some(3), .. })
    ));

    let journal = dev.journal();
    let launched = journal.iter().filter(|e| matches!(e, Entry::Launch { .. })).count();
    assert_eq!(launched, 3);
    let last_launch = journal.iter().rposition(|e| matches!(e, Entry::Launch { .. })).unwrap();
    let release = journal.iter().rposition(|e| matches!(e, Entry::Release { .. })).unwrap();
    assert!(release > last_launch);
    assert_eq!(dev.releases(), FULL_TEARDOWN);
}

#[test]
fn unknown_entry_point_releases_program_but_no_kernel() {
    let dev = SimDevice::new(SimConfig::default());
    let cfg = InteropConfig { kernel_entry: "main".into(), ..Default::default() };
    let lc = Lifecycle::new(cfg, dev.graphics(), dev.compute()).unwrap();
    let out = lc.run([SurfaceEvent::Redraw]);

    assert!(matches!(out.error, Some(InteropError::KernelCreation { .. })));
    assert_eq!(
        dev.releases(),
        vec![Resource::Queue, Resource::Program, Resource::Context, Resource::Buffer]
    );
}

#[test]
fn truncated_buffer_fails_before_compute_setup() {
    let dev = SimDevice::new(SimConfig { truncate_buffers_to: Some(1024), ..Default::default() });
    let mut lc = Lifecycle::new(InteropConfig::default(), dev.graphics(), dev.compute()).unwrap();

    assert!(matches!(
        lc.initialize(),
        Err(InteropError::BufferSize { expected: 4096, actual: 1024, .. })
    ));
    assert_eq!(lc.phase(), Phase::Exited(ExitStatus::Failure));
    assert_eq!(dev.live_buffers(), 0);
    assert_eq!(dev.live_objects(), 0);
}

#[test]
fn gpu_failure_falls_back_to_cpu_when_configured() {
    let sim = SimConfig { fail_gpu_context: true, ..Default::default() };

    let dev = SimDevice::new(sim.clone());
    let out = Lifecycle::new(InteropConfig::default(), dev.graphics(), dev.compute())
        .unwrap()
        .run([SurfaceEvent::Redraw]);
    assert!(matches!(
        out.error,
        Some(InteropError::ContextCreation { device: DeviceKind::Gpu, .. })
    ));
    assert_eq!(dev.releases(), vec![Resource::Buffer]);

    let dev = SimDevice::new(sim);
    let cfg = InteropConfig { device_policy: DevicePolicy::GpuThenCpu, iterations: 1, ..Default::default() };
    let out = Lifecycle::new(cfg, dev.graphics(), dev.compute())
        .unwrap()
        .run([SurfaceEvent::Redraw]);
    assert_eq!(out.status, ExitStatus::Success);
    assert_eq!(out.device.map(|d| d.kind), Some(DeviceKind::Cpu));
}

#[test]
fn external_kernel_source_with_other_fill_value() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "__kernel void paint(__global float4 *vbo) {{ vbo[get_global_id(0)] = (float4)(1, 2, 3, 4); }}"
    )
    .unwrap();

    let cfg = InteropConfig {
        kernel_source: Some(file.path().to_path_buf()),
        kernel_entry: "paint".into(),
        ..continuous(2)
    };
    let dev = SimDevice::new(SimConfig::default());
    let mut lc = Lifecycle::new(cfg, dev.graphics(), dev.compute()).unwrap();
    // Quelle ist beim Konstruieren gelesen worden
    drop(file);

    lc.initialize().unwrap();
    lc.handle(SurfaceEvent::Idle);
    assert!(lc.read_back().unwrap().iter().all(|v| *v == Float4([1.0, 2.0, 3.0, 4.0])));
}

#[test]
fn oversized_element_count_is_rejected_before_any_device_work() {
    let dev = SimDevice::new(SimConfig::default());
    let cfg = InteropConfig { element_count: 1usize << 60, ..Default::default() };
    assert!(matches!(
        Lifecycle::new(cfg, dev.graphics(), dev.compute()),
        Err(InteropError::Config(_))
    ));
    assert!(dev.journal().is_empty());
}

#[test]
fn missing_kernel_file_is_a_config_error() {
    let dev = SimDevice::new(SimConfig::default());
    let cfg = InteropConfig {
        kernel_source: Some("/nonexistent/kernel.cl".into()),
        ..Default::default()
    };
    assert!(matches!(
        Lifecycle::new(cfg, dev.graphics(), dev.compute()),
        Err(InteropError::Config(_))
    ));
}

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use vbo_interop::sim::{SimConfig, SimDevice};
use vbo_interop::{InteropConfig, Lifecycle, RunMode, SurfaceEvent};

// Ein Frame = Acquire, `iterations` Starts, Release, Finish
fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame");
    for &iterations in &[1u32, 100, 8000] {
        group.bench_with_input(BenchmarkId::from_parameter(iterations), &iterations, |b, &it| {
            let dev = SimDevice::new(SimConfig::default());
            let cfg = InteropConfig { iterations: it, run_mode: RunMode::Continuous, ..Default::default() };
            let mut lc = Lifecycle::new(cfg, dev.graphics(), dev.compute()).unwrap();
            lc.initialize().unwrap();
            b.iter(|| black_box(lc.handle(SurfaceEvent::Idle)));
            lc.shutdown();
        });
    }
    group.finish();
}

// kompletter Lauf inklusive Aufbau und Abbau
fn bench_full_run(c: &mut Criterion) {
    c.bench_function("full_run_8000", |b| {
        b.iter(|| {
            let dev = SimDevice::new(SimConfig::default());
            let lc = Lifecycle::new(InteropConfig::default(), dev.graphics(), dev.compute()).unwrap();
            black_box(lc.run([SurfaceEvent::Redraw]).status)
        });
    });
}

criterion_group!(benches, bench_frame, bench_full_run);
criterion_main!(benches);

//! Benchmarks for frame propagation
//!
//! Run with: cargo bench -p motive-core

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use motive_core::{
    AnimationSpec, DerivedCell, Easing, FrameLoop, PropertyBag, Runtime, Scope, TimingConfig,
    ValueCell,
};
use std::hint::black_box;

/// A value cell followed by `depth` derived cells, each reading the previous.
fn make_chain(scope: &Scope, depth: usize) -> (ValueCell<f64>, DerivedCell<f64>) {
    let source = scope.value(0.0_f64);
    let mut last = {
        let source = source.clone();
        scope.derived(move || source.read() + 1.0).unwrap()
    };
    for _ in 1..depth {
        let prev = last.clone();
        last = scope.derived(move || prev.read() + 1.0).unwrap();
    }
    (source, last)
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/chain");

    for depth in [1, 10, 100, 500] {
        let runtime = Runtime::default();
        let scope = runtime.scope("bench");
        let (source, tail) = make_chain(&scope, depth);
        let mut frames = FrameLoop::new(&runtime);
        let mut t = 0.0;

        group.bench_with_input(BenchmarkId::new("write_and_tick", depth), &depth, |b, _| {
            b.iter(|| {
                t += 16.0;
                source.write(t);
                frames.tick(t);
                black_box(tail.peek())
            })
        });
    }

    group.finish();
}

fn bench_fan_out_styles(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/styles");

    for width in [10, 100, 1000] {
        let runtime = Runtime::default();
        let scope = runtime.scope("bench");
        let progress = scope.value(0.0_f64);
        let styles: Vec<_> = (0..width)
            .map(|i| {
                let progress = progress.clone();
                let offset = i as f64;
                scope.style(move || {
                    PropertyBag::new()
                        .with("opacity", progress.read())
                        .with("translateY", progress.read() * offset)
                })
            })
            .collect();
        let mut frames = FrameLoop::new(&runtime);
        frames.tick(0.0);
        let mut t = 0.0;

        group.bench_with_input(BenchmarkId::new("write_and_render", width), &width, |b, _| {
            b.iter(|| {
                t += 16.0;
                progress.write(t);
                black_box(frames.tick(t))
            })
        });
        black_box(styles.len());
    }

    group.finish();
}

fn bench_animation_runs(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/runs");

    for count in [10, 100, 1000] {
        let runtime = Runtime::default();
        let scope = runtime.scope("bench");
        let cells: Vec<_> = (0..count).map(|_| scope.value(0.0_f64)).collect();
        let mut frames = FrameLoop::new(&runtime);
        let mut t = 0.0;

        group.bench_with_input(BenchmarkId::new("timing_to_completion", count), &count, |b, _| {
            b.iter(|| {
                for (i, cell) in cells.iter().enumerate() {
                    let to = if cell.peek() > 0.0 { 0.0 } else { 100.0 + i as f64 };
                    let config = TimingConfig::new(100.0, Easing::EaseInOut);
                    let spec = AnimationSpec::timing(to, config).unwrap();
                    cell.animate_to(spec).unwrap();
                }
                let reports = frames.run_until_idle(t, 16);
                t += 1000.0;
                black_box(reports.len())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chain, bench_fan_out_styles, bench_animation_runs);
criterion_main!(benches);

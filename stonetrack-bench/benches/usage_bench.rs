//! Component usage accumulation benchmarks.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use stonetrack_core::{Component, MachineUsageAccumulator};

fn accumulator() -> MachineUsageAccumulator {
    let usage = MachineUsageAccumulator::new();
    usage
        .register_component(Component::new("c-1", "m-1", "blade", 1e12, Utc::now()))
        .unwrap();
    usage
}

fn bench_record_usage(c: &mut Criterion) {
    let mut group = c.benchmark_group("usage");
    group.throughput(Throughput::Elements(1));

    let usage = accumulator();
    group.bench_function("record_usage", |b| {
        b.iter(|| black_box(usage.record_usage("c-1", black_box(12.5)).unwrap()))
    });

    group.bench_function("evaluate_expiry", |b| {
        b.iter(|| black_box(usage.evaluate_expiry("c-1").unwrap()))
    });

    group.bench_function("record_usage_4_threads", |b| {
        b.iter(|| {
            std::thread::scope(|s| {
                for _ in 0..4 {
                    s.spawn(|| {
                        for _ in 0..100 {
                            usage.record_usage("c-1", 1.0).unwrap();
                        }
                    });
                }
            })
        })
    });

    group.finish();
}

criterion_group!(benches, bench_record_usage);
criterion_main!(benches);

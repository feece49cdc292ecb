//! Stack operation benchmarks.
//!
//! Measures push/pop and full verification cost at each protection level.

use std::time::Duration;

use canarystack_bench::{filled_stack, levels};
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

const BURST: usize = 1024;

fn bench_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_pop");
    group.throughput(Throughput::Elements(BURST as u64));

    for (label, level) in levels() {
        group.bench_function(BenchmarkId::new(label, BURST), |b| {
            b.iter_batched(
                || filled_stack(level, 0),
                |mut stack| {
                    for value in 0..BURST as i32 {
                        black_box(stack.push(value));
                    }
                    let mut out = 0;
                    for _ in 0..BURST {
                        black_box(stack.pop(Some(&mut out)));
                    }
                    stack
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify");
    group.throughput(Throughput::Elements(1));

    for (label, level) in levels() {
        for len in [8usize, 1024] {
            let stack = filled_stack(level, len);
            group.bench_with_input(BenchmarkId::new(label, len), &stack, |b, stack| {
                b.iter(|| black_box(stack.verify()));
            });
        }
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(200))
        .measurement_time(Duration::from_secs(2))
        .sample_size(50);
    targets = bench_push_pop, bench_verify
);
criterion_main!(benches);

//! Micro-benchmark for the local executor's spawn + poll-to-completion
//! path, the same kind of per-op overhead budget `ksvc-module` benchmarks
//! for its ring/worker-pool primitives.

use criterion::{criterion_group, criterion_main, Criterion};
use hio_task::{run_ready, spawn};

fn bench_spawn_detached(c: &mut Criterion) {
    c.bench_function("spawn_and_run_detached", |b| {
        b.iter(|| {
            spawn(async { 1u32 + 1 }).detach();
            run_ready();
        });
    });
}

criterion_group!(benches, bench_spawn_detached);
criterion_main!(benches);

//! Counter benchmarks: cost of counting on the dispatch path
//!
//! Measures:
//! - uncontended `increment`
//! - `increment` while other threads count into the same window
//! - `snapshot_and_reset` against a populated window

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use topicwatch::StatsCounter;

const BATCH: u64 = 10_000;

fn increment_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("stats/increment");
    group.throughput(Throughput::Elements(BATCH));

    let stats = StatsCounter::new();
    group.bench_function("uncontended", |b| {
        b.iter(|| {
            for _ in 0..BATCH {
                black_box(stats.increment());
            }
        });
    });
    group.finish();
}

fn increment_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("stats/increment_contended");
    group.throughput(Throughput::Elements(BATCH));
    group.measurement_time(Duration::from_secs(5));

    for &others in &[1usize, 3] {
        let stats = Arc::new(StatsCounter::new());
        let stop = Arc::new(AtomicBool::new(false));

        let background: Vec<_> = (0..others)
            .map(|_| {
                let stats = Arc::clone(&stats);
                let stop = Arc::clone(&stop);
                thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        stats.increment();
                    }
                })
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(others), &others, |b, _| {
            b.iter(|| {
                for _ in 0..BATCH {
                    black_box(stats.increment());
                }
            });
        });

        stop.store(true, Ordering::Relaxed);
        for handle in background {
            handle.join().unwrap();
        }
    }
    group.finish();
}

fn snapshot_and_reset(c: &mut Criterion) {
    let stats = StatsCounter::new();
    c.bench_function("stats/snapshot_and_reset", |b| {
        b.iter(|| {
            stats.increment();
            black_box(stats.snapshot_and_reset())
        });
    });
}

criterion_group!(
    benches,
    increment_uncontended,
    increment_contended,
    snapshot_and_reset
);
criterion_main!(benches);

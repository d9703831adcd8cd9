use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::{Duration, Instant};

use seqbridge::prelude::{
    CancelToken, PoolConfig, Sequence, Sink, WorkerPool, fan_in, producer, range,
};

fn run_fan_in(producers: usize, per_producer: u64) -> Duration {
    let work = (0..producers)
        .map(|_| {
            producer(move |mut sink: Sink<u64>| {
                for i in 0..per_producer {
                    if sink.value(i).is_err() {
                        return;
                    }
                }
            })
        })
        .collect();

    let start = Instant::now();
    let mut seq = fan_in(&CancelToken::new_root(), work).unwrap();
    let mut sum = 0u64;
    while seq.advance() {
        sum = sum.wrapping_add(*seq.current().unwrap());
    }
    black_box(sum);
    start.elapsed()
}

fn run_pool(workers: usize, items: u64) -> Duration {
    let pool = WorkerPool::new(PoolConfig::with_workers(workers));

    let start = Instant::now();
    let mut seq = pool
        .map(&CancelToken::new_root(), range(0, items), |v| {
            Ok(black_box(v.wrapping_mul(2654435761)))
        })
        .unwrap();
    let mut count = 0u64;
    while seq.advance() {
        count += 1;
    }
    assert_eq!(count, items);
    start.elapsed()
}

pub fn bench_fan_in(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_in_rendezvous");

    for &producers in &[1usize, 4, 16] {
        group.bench_function(BenchmarkId::from_parameter(producers), |b| {
            b.iter_custom(|n| {
                let mut total = Duration::ZERO;
                for _ in 0..n {
                    total += run_fan_in(producers, 10_000);
                }
                total
            });
        });
    }

    group.finish();
}

pub fn bench_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("worker_pool_map");

    for &workers in &[1usize, 4, 8] {
        group.bench_function(BenchmarkId::from_parameter(workers), |b| {
            b.iter_custom(|n| {
                let mut total = Duration::ZERO;
                for _ in 0..n {
                    total += run_pool(workers, 50_000);
                }
                total
            });
        });
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_secs(3))
        .sample_size(12);
    targets = bench_fan_in, bench_pool
}
criterion_main!(benches);

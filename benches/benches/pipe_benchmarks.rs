use std::{hint::black_box, sync::Arc, time::Duration};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pipebus::Pipe;

const WAIT: Duration = Duration::from_secs(1);
const BATCH: u64 = 1_000;

fn bench_try_roundtrip(c: &mut Criterion) {
    let pipe = Pipe::new(1);
    c.bench_function("pipe_try_enqueue_dequeue", |b| {
        b.iter(|| {
            pipe.try_enqueue(black_box(1u64)).unwrap();
            black_box(pipe.try_dequeue().unwrap());
        })
    });
}

/// Писатель и читатель в разных задачах: стоимость ожидания места.
fn bench_producer_consumer(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("pipe_producer_consumer");
    group.throughput(Throughput::Elements(BATCH));
    for limit in [1usize, 16, 0] {
        group.bench_with_input(BenchmarkId::from_parameter(limit), &limit, |b, &limit| {
            b.to_async(&rt).iter(|| async move {
                let pipe = Arc::new(Pipe::new(limit));
                let producer = {
                    let pipe = pipe.clone();
                    tokio::spawn(async move {
                        for i in 0..BATCH {
                            pipe.enqueue(i, WAIT).await.unwrap();
                        }
                        pipe.close();
                    })
                };
                while let Some(value) = pipe.dequeue(WAIT).await.unwrap() {
                    black_box(value);
                }
                producer.await.unwrap();
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_try_roundtrip, bench_producer_consumer);
criterion_main!(benches);

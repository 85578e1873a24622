use std::{hint::black_box, time::Duration};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pipebus::{Broker, Subscription};
use tokio::runtime::Runtime;

const WAIT: Duration = Duration::from_secs(1);

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn bench_subscribe_unsubscribe(c: &mut Criterion) {
    let broker = Broker::<u64>::with_defaults();
    c.bench_function("broker_subscribe_unsubscribe", |b| {
        b.iter(|| {
            let sub = black_box(broker.subscribe("chan", 5, WAIT).unwrap());
            broker.unsubscribe("chan", &sub).unwrap();
        })
    });
}

fn bench_publish_0_subs(c: &mut Criterion) {
    let rt = runtime();
    let broker = Broker::<u64>::with_defaults();
    broker.create_topic("chan").unwrap();
    c.bench_function("publish_0_subs", |b| {
        b.to_async(&rt).iter(|| async {
            broker.publish("chan", black_box(1), WAIT).await.unwrap();
        })
    });
}

/// Публикация и чтение всеми подписчиками.
fn bench_publish_receive(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("publish_receive");
    for subs in [1usize, 10, 100] {
        let broker = Broker::<u64>::with_defaults();
        let mut subscriptions: Vec<Subscription<u64>> = (0..subs)
            .map(|_| broker.subscribe("chan", 1, WAIT).unwrap())
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(subs), &subs, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    broker.publish("chan", black_box(7), WAIT).await.unwrap();
                    for sub in subscriptions.iter_mut() {
                        black_box(sub.next().await);
                    }
                })
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_subscribe_unsubscribe,
    bench_publish_0_subs,
    bench_publish_receive
);
criterion_main!(benches);

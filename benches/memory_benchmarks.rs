use std::{hint::black_box, sync::Arc};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nsqbridge::{MemoryBroker, Messenger, PatternRouter, Value, DEFAULT_PATTERN};
use tokio::{runtime::Runtime, sync::mpsc};

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

/// Публикация N значений и ожидание их доставки одному подписчику.
fn bench_publish_deliver(c: &mut Criterion) {
    let rt = runtime();
    let messenger = Messenger::with_transport(
        PatternRouter::new(DEFAULT_PATTERN).unwrap(),
        Arc::new(MemoryBroker::new()),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscriber = rt
        .block_on(messenger.subscribe("@bench", move |v: Value| {
            let _ = tx.send(v);
        }))
        .unwrap();

    let mut group = c.benchmark_group("memory publish/deliver");
    for n in [1usize, 100, 1000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                rt.block_on(async {
                    for i in 0..n {
                        messenger.publish("@bench", i as i64).await.unwrap();
                    }
                    for _ in 0..n {
                        black_box(rx.recv().await.unwrap());
                    }
                })
            })
        });
    }
    group.finish();

    rt.block_on(async {
        subscriber.cancel().await;
        messenger.shutdown().await;
    });
}

criterion_group!(benches, bench_publish_deliver);
criterion_main!(benches);

//! Queue benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ebbsync_bench::random_payload;
use ebbsync_engine::{MonitorConfig, NetworkMonitor, QueueConfig, SyncQueue};
use ebbsync_store::LogStore;
use tokio::runtime::Runtime;

/// Benchmark enqueueing while offline, including the persistence round trip.
fn bench_enqueue(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let queue = runtime.block_on(async {
        SyncQueue::open(
            LogStore::in_memory(),
            NetworkMonitor::new(MonitorConfig::default()),
            QueueConfig::default(),
        )
        .await
        .unwrap()
    });
    let payload = random_payload(8);

    c.bench_function("enqueue_offline", |b| {
        b.to_async(&runtime).iter(|| async {
            let id = queue
                .enqueue("send_message", black_box(payload.clone()), 0)
                .await
                .unwrap();
            black_box(id);
        });
    });
}

criterion_group!(benches, bench_enqueue);

criterion_main!(benches);

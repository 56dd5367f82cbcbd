//! Operation store benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ebbsync_bench::generate_operations;
use ebbsync_store::record::LogRecord;
use ebbsync_store::{
    Durability, InMemoryBackend, LogStore, LogStoreOptions, OperationStatus, OperationStore,
};
use tempfile::TempDir;

/// Benchmark puts against the in-memory backend.
fn bench_memory_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_put");

    for fields in [2, 16, 64].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(fields), fields, |b, &fields| {
            let store = LogStore::in_memory();
            let ops = generate_operations(256, fields);
            let mut idx = 0;

            b.iter(|| {
                store.put(black_box(&ops[idx])).unwrap();
                idx = (idx + 1) % ops.len();
            });
        });
    }

    group.finish();
}

/// Benchmark puts against a file with buffered durability.
fn bench_file_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_put_buffered");

    // Use larger sample size for file operations
    group.sample_size(50);

    for fields in [2, 16, 64].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(fields), fields, |b, &fields| {
            let temp_dir = TempDir::new().unwrap();
            let options = LogStoreOptions::default().with_durability(Durability::Buffered);
            let store =
                LogStore::open_file_with(&temp_dir.path().join("queue.log"), options).unwrap();
            let ops = generate_operations(256, fields);
            let mut idx = 0;

            b.iter(|| {
                store.put(black_box(&ops[idx])).unwrap();
                idx = (idx + 1) % ops.len();
            });
        });
    }

    group.finish();
}

/// Benchmark replaying a log of 1000 operations with status updates.
fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");

    let mut image = Vec::new();
    for mut op in generate_operations(1000, 8) {
        image.extend(LogRecord::Put(op.clone()).encode().unwrap());
        op.status = OperationStatus::Processing;
        image.extend(LogRecord::Put(op).encode().unwrap());
    }

    group.throughput(Throughput::Bytes(image.len() as u64));
    group.bench_function("1k_operations", |b| {
        b.iter(|| {
            let backend = InMemoryBackend::with_data(image.clone());
            let store = LogStore::open(backend, LogStoreOptions::default()).unwrap();
            black_box(store.len());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_memory_put, bench_file_put, bench_replay);

criterion_main!(benches);

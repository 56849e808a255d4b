//! Engine latency benchmarks.
//!
//! Measures retrieve and store against the in-process backend, so the numbers
//! reflect hashing, slicing and encoding rather than the medium.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use half::f16;
use tokio::runtime::Runtime;

use gg_latent::{Latent, MemoryBackend, SafetensorsCodec, StoragingEngine};

const CHUNK_SIZE: usize = 64;
const LAYERS: usize = 8;
const HIDDEN: usize = 64;

fn latent(seq: usize) -> Latent {
    let values = vec![f16::from_f32(0.5); LAYERS * seq * HIDDEN];
    Latent::from_f16(vec![LAYERS, seq, HIDDEN], &values).unwrap()
}

fn engine() -> StoragingEngine {
    StoragingEngine::new(CHUNK_SIZE, Arc::new(MemoryBackend::new()), Arc::new(SafetensorsCodec))
        .unwrap()
}

fn bench_retrieve(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("engine_retrieve");

    for chunks in [1usize, 8, 32] {
        let len = chunks * CHUNK_SIZE;
        let tokens: Vec<u32> = (0..len as u32).collect();
        let engine = engine();
        rt.block_on(engine.store(&tokens, &latent(len), 0)).unwrap();

        group.throughput(Throughput::Elements(len as u64));
        group.bench_function(BenchmarkId::new("hit", chunks), |b| {
            b.to_async(&rt)
                .iter(|| async { black_box(engine.retrieve(&tokens).await.unwrap()) })
        });
    }

    let cold = engine();
    let tokens: Vec<u32> = (0..(32 * CHUNK_SIZE) as u32).collect();
    group.bench_function("miss", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(cold.retrieve(&tokens).await.unwrap()) })
    });

    group.finish();
}

fn bench_store(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("engine_store");

    for chunks in [1usize, 8, 32] {
        let len = chunks * CHUNK_SIZE;
        let tokens: Vec<u32> = (0..len as u32).collect();
        let l = latent(len);
        let engine = engine();

        group.throughput(Throughput::Elements(len as u64));
        group.bench_function(BenchmarkId::new("full", chunks), |b| {
            b.to_async(&rt)
                .iter(|| async { black_box(engine.store(&tokens, &l, 0).await.unwrap()) })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_retrieve, bench_store);
criterion_main!(benches);

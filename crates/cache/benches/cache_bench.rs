//! Cache benchmarks
//!
//! Run with: cargo bench -p filecache --bench cache_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use filecache::{CacheConfig, CompressionAlgorithm, FileCache, Ttl, Value};
use std::time::Duration;
use tempfile::TempDir;

fn cache_in(dir: &TempDir, compress: Option<CompressionAlgorithm>) -> FileCache {
    let mut builder = CacheConfig::builder(dir.path()).sharding(2);
    if let Some(algorithm) = compress {
        builder = builder.compression(algorithm, 3, 0);
    }
    FileCache::new(builder.build().unwrap()).unwrap()
}

fn document(size: usize) -> Value {
    Value::map([
        ("title", Value::from("Lorem ipsum")),
        ("body", Value::from("Lorem ipsum dolor sit amet ".repeat(size / 27 + 1))),
        ("views", Value::Int(1234)),
    ])
}

fn bench_set_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_get");
    group.measurement_time(Duration::from_secs(5));

    for size in [256usize, 4 * 1024, 64 * 1024] {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, None);
        let value = document(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("set", size), &value, |b, value| {
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                cache
                    .set(&format!("doc.{}", i % 512), value.clone(), Ttl::Never)
                    .unwrap();
            });
        });

        cache.set("hot", value.clone(), Ttl::Never).unwrap();
        group.bench_function(BenchmarkId::new("get", size), |b| {
            b.iter(|| black_box(cache.get("hot").unwrap()));
        });
    }

    group.finish();
}

fn bench_compression(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression");
    let value = document(64 * 1024);

    for (name, algorithm) in [
        ("raw", None),
        ("zstd", Some(CompressionAlgorithm::Zstd)),
        ("gzip", Some(CompressionAlgorithm::Gzip)),
    ] {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, algorithm);
        cache.set("doc", value.clone(), Ttl::Never).unwrap();

        group.bench_function(BenchmarkId::new("write", name), |b| {
            b.iter(|| cache.set("doc", value.clone(), Ttl::Never).unwrap());
        });
        group.bench_function(BenchmarkId::new("read", name), |b| {
            b.iter(|| black_box(cache.get("doc").unwrap()));
        });
    }

    group.finish();
}

fn bench_increment(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let cache = cache_in(&dir, None);

    c.bench_function("increment", |b| {
        b.iter(|| black_box(cache.increment("counter", 1).unwrap()));
    });
}

criterion_group!(benches, bench_set_get, bench_compression, bench_increment);
criterion_main!(benches);

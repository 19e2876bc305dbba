//! Storage benchmarks for Hindsight
//!
//! Run with: cargo bench
//!
//! These benchmarks measure the core write path (upsert with index
//! reconciliation and history capture), point reads, and planned list
//! queries.

use std::collections::HashMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hindsight::{
    FieldFunc, FieldValue, Filter, IndexFunc, JsonCodec, ListOptionIndexer, ListOptions,
};
use serde::{Deserialize, Serialize};
use tempfile::tempdir;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Car {
    key: String,
    revision: i64,
    wheels: i64,
    brand: String,
    color: String,
}

fn car(i: i64) -> Car {
    Car {
        key: format!("car-{i}"),
        revision: i,
        wheels: 4,
        brand: if i % 2 == 0 { "ford" } else { "audi" }.to_string(),
        color: format!("color-{}", i % 16),
    }
}

fn open_cache(dir: &tempfile::TempDir) -> ListOptionIndexer<Car> {
    let mut indexers: HashMap<String, IndexFunc<Car>> = HashMap::new();
    indexers.insert(
        "by-brand".to_string(),
        Arc::new(|c: &Car| Ok(vec![c.brand.clone()])),
    );

    let mut fields: HashMap<String, FieldFunc<Car>> = HashMap::new();
    fields.insert(
        "Brand".to_string(),
        Arc::new(|c: &Car| FieldValue::from(c.brand.as_str())),
    );
    fields.insert(
        "Color".to_string(),
        Arc::new(|c: &Car| FieldValue::from(c.color.as_str())),
    );

    ListOptionIndexer::open(
        dir.path().join("bench.sqlite"),
        JsonCodec::new(),
        Arc::new(|c: &Car| Ok(c.revision)),
        indexers,
        fields,
    )
    .unwrap()
}

/// Benchmark single upserts (object + indices + field columns + history).
fn bench_upsert(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let cache = open_cache(&dir);
    let mut revision = 0i64;

    c.bench_function("upsert", |b| {
        b.iter(|| {
            revision += 1;
            let mut obj = car(revision % 1_000);
            obj.revision = revision;
            cache.upsert(&obj.key, black_box(&obj)).unwrap()
        })
    });
}

/// Benchmark point reads by key.
fn bench_get_by_key(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let cache = open_cache(&dir);
    for i in 0..1_000 {
        let obj = car(i);
        cache.upsert(&obj.key, &obj).unwrap();
    }

    c.bench_function("get_by_key", |b| {
        b.iter(|| cache.get_by_key(black_box("car-500")).unwrap())
    });
}

/// Benchmark planned list queries at several store sizes.
fn bench_list_by_options(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_by_options");

    for size in [100, 1_000, 10_000] {
        let dir = tempdir().unwrap();
        let cache = open_cache(&dir);
        for i in 0..size {
            let obj = car(i);
            cache.upsert(&obj.key, &obj).unwrap();
        }

        let opts = ListOptions {
            filters: vec![Filter {
                field: vec!["Brand".to_string()],
                contains: "ford".to_string(),
            }],
            ..Default::default()
        };

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| cache.list_by_options(black_box(&opts)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_upsert, bench_get_by_key, bench_list_by_options);
criterion_main!(benches);

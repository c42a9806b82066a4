use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use gnx_core::engine::{ParallelExecutionEngine, ParallelizationPolicy};
use gnx_core::query::{AggSpec, Query, count, every, field, sum};
use gnx_core::{Database, DurabilityLevel, EngineConfig, ModelBuilder, SchemaManager, Value};
use rayon::prelude::*;

fn open(root: &std::path::Path, policy: ParallelizationPolicy) -> Database {
    SchemaManager::new(
        EngineConfig::new()
            .with_root(root)
            .with_durability(DurabilityLevel::Lazy)
            .with_parallelism(policy),
    )
    .create(
        "bench",
        [ModelBuilder::new("Order")
            .string("customer", 16)
            .int("amount")
            .indexed()
            .int("region")
            .bool("paid")],
        true,
    )
    .unwrap()
}

fn rows(n: usize) -> Vec<Vec<Value>> {
    (0..n)
        .map(|i| {
            vec![
                Value::from(format!("cust{}", i % 997)),
                Value::Int((i * 7919 % 10_000) as i64),
                Value::Int((i % 8) as i64),
                Value::Bool(i % 3 == 0),
            ]
        })
        .collect()
}

// ════════════════════════════════════════════
// Insert
// ════════════════════════════════════════════

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    for size in [1_000usize, 10_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("bulk_create", size), &size, |b, &size| {
            b.iter_with_setup(
                || (tempfile::tempdir().unwrap(), rows(size)),
                |(dir, batch)| {
                    let db = open(dir.path(), ParallelizationPolicy::Auto);
                    black_box(db.bulk_create("Order", batch).unwrap());
                },
            );
        });
    }
    group.finish();
}

// ════════════════════════════════════════════
// Filter: index-assisted vs full scan, per policy
// ════════════════════════════════════════════

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");
    let size = 50_000;
    group.throughput(Throughput::Elements(size as u64));

    for (name, policy) in [
        ("sequential", ParallelizationPolicy::Fixed(1)),
        ("auto", ParallelizationPolicy::Auto),
    ] {
        let dir = tempfile::tempdir().unwrap();
        let db = open(dir.path(), policy);
        db.bulk_create("Order", rows(size)).unwrap();

        let indexed = Query::new("Order").filter(field("amount").between(1_000, 1_500));
        group.bench_function(BenchmarkId::new("indexed_between", name), |b| {
            b.iter(|| black_box(db.all(&indexed).unwrap().len()));
        });

        let scan = Query::new("Order").filter(every([
            field("region").equals(3),
            field("customer").regex("cust1.*"),
        ]));
        group.bench_function(BenchmarkId::new("scan_regex", name), |b| {
            b.iter(|| black_box(db.count(&scan).unwrap()));
        });
    }
    group.finish();
}

// ════════════════════════════════════════════
// Aggregate
// ════════════════════════════════════════════

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    let size = 50_000;
    group.throughput(Throughput::Elements(size as u64));

    let dir = tempfile::tempdir().unwrap();
    let db = open(dir.path(), ParallelizationPolicy::Auto);
    db.bulk_create("Order", rows(size)).unwrap();

    let q = Query::new("Order")
        .filter(field("paid").equals(true))
        .agg(AggSpec::new().by("region").with("n", count()).with("total", sum("amount")));
    group.bench_function("group_by_region", |b| {
        b.iter(|| black_box(db.aggregate(&q).unwrap()));
    });
    group.finish();
}

// ════════════════════════════════════════════
// Parallel Execution Engine policies
// ════════════════════════════════════════════

fn bench_parallel_engine_policies(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_engine_policies");
    for size in [1_000usize, 100_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("fixed_4", size), &size, |b, &size| {
            let engine = ParallelExecutionEngine::new_fixed(4).unwrap();
            b.iter(|| {
                engine.execute(|| {
                    (0..size)
                        .into_par_iter()
                        .map(|i| black_box(i * 2))
                        .sum::<usize>()
                })
            });
        });
        group.bench_with_input(BenchmarkId::new("sequential", size), &size, |b, &size| {
            b.iter(|| (0..size).map(|i| black_box(i * 2)).sum::<usize>());
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_insert,
    bench_filter,
    bench_aggregate,
    bench_parallel_engine_policies
);
criterion_main!(benches);

//! Per-phase benchmarks for the embedded backends.
//!
//! Server backends are measured by the `tsbench` binary; these benches cover
//! the in-process ones so adapter overhead can be tracked without containers.
//!
//! Example: cargo bench --bench phases --features duckdb

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tsbench::{generate_records, AnyBackend, Backend, BackendKind, BackendSpec, Record, RunContext};

/// Rows loaded before the steady-state phases.
const PRELOAD: usize = 10_000;

fn specs() -> Vec<BackendSpec> {
    let mut specs = vec![BackendSpec::new(BackendKind::Memory)];
    if BackendKind::DuckDb.is_available() {
        specs.push(BackendSpec::new(BackendKind::DuckDb).with_duckdb_in_memory());
    }
    specs
}

fn loaded(spec: &BackendSpec, records: &[Record]) -> AnyBackend {
    let mut backend = AnyBackend::connect(spec).unwrap();
    backend.setup().unwrap();
    backend.upsert_bulk(records).unwrap();
    backend
}

fn bench_upsert_single(c: &mut Criterion) {
    let mut group = c.benchmark_group("phases/upsert_single");
    let records = generate_records(PRELOAD, &RunContext::new());

    for spec in specs() {
        let mut backend = loaded(&spec, &records);
        for subset in [100, 1_000] {
            group.bench_with_input(BenchmarkId::new(&spec.name, subset), &subset, |b, &subset| {
                b.iter(|| backend.upsert_single(black_box(&records[..subset])).unwrap());
            });
        }
    }

    group.finish();
}

fn bench_upsert_bulk(c: &mut Criterion) {
    let mut group = c.benchmark_group("phases/upsert_bulk");
    let records = generate_records(PRELOAD, &RunContext::new());

    for spec in specs() {
        let mut backend = loaded(&spec, &records);
        for subset in [100, 1_000] {
            group.bench_with_input(BenchmarkId::new(&spec.name, subset), &subset, |b, &subset| {
                b.iter(|| backend.upsert_bulk(black_box(&records[..subset])).unwrap());
            });
        }
    }

    group.finish();
}

fn bench_ordered_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("phases/ordered_read");
    let records = generate_records(PRELOAD, &RunContext::new());

    for spec in specs() {
        let mut backend = loaded(&spec, &records);
        for limit in [10, 100, 4_000] {
            group.bench_with_input(BenchmarkId::new(&spec.name, limit), &limit, |b, &limit| {
                b.iter(|| {
                    let rows = backend.get_ordered_with_limit(limit).unwrap();
                    black_box(rows.len());
                });
            });
        }
    }

    group.finish();
}

fn bench_bulk_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("phases/bulk_load");
    group.sample_size(10);
    let records = generate_records(PRELOAD, &RunContext::new());

    for spec in specs() {
        let mut backend = AnyBackend::connect(&spec).unwrap();
        group.bench_function(&spec.name, |b| {
            b.iter(|| {
                backend.setup().unwrap();
                backend.upsert_bulk(black_box(&records)).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_upsert_single,
    bench_upsert_bulk,
    bench_ordered_read,
    bench_bulk_load,
);
criterion_main!(benches);

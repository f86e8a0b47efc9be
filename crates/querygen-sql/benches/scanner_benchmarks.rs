//! Benchmarks for scanning and parsing query files
//!
//! These benchmarks measure throughput on generated files with many
//! annotated queries.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use querygen_sql::{parse_source, tokenize, ParseOptions};

/// Generate a query file with N annotated queries
fn generate_query_file(num_queries: usize) -> String {
    let mut src = String::from("-- Generated queries.\n\n");
    for i in 0..num_queries {
        src.push_str(&format!(
            "-- Query{i} reads one row.\n-- name: Query{i} :one\nSELECT id, 'text; with semicolon', $$body$$\nFROM table_{i}\nWHERE id = querygen.arg('ID') AND name = querygen.arg('Name');\n\n"
        ));
    }
    src
}

fn bench_tokenize(c: &mut Criterion) {
    let mut group = c.benchmark_group("tokenize");
    for size in [10, 100, 1000] {
        let src = generate_query_file(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &src, |b, src| {
            b.iter(|| tokenize(black_box(src), "querygen"))
        });
    }
    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let options = ParseOptions::default();
    let mut group = c.benchmark_group("parse");
    for size in [10, 100, 1000] {
        let src = generate_query_file(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &src, |b, src| {
            b.iter(|| parse_source("bench.sql", black_box(src), &options))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_tokenize, bench_parse);
criterion_main!(benches);

//! Benchmarks for SeriesDB ingestion, queries and the codec
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use seriesdb_core::codec::{decode_series, encode_series, ReplayPolicy};
use seriesdb_core::storage::{Engine, EngineConfig};
use seriesdb_core::{AggregationType, Label};

const START: u64 = 1551347864;

fn engine_with_rules(rules: bool) -> Engine {
    let mut engine = Engine::new(EngineConfig::default());
    engine
        .create_series_with_defaults("bench", vec![Label::new("index", "0")])
        .unwrap();
    if rules {
        for (agg, bucket) in [
            (AggregationType::Avg, 10),
            (AggregationType::Avg, 60),
            (AggregationType::Count, 10),
        ] {
            let dest = format!("bench_{}_{}", agg.name().to_lowercase(), bucket);
            engine.create_series_with_defaults(&dest, Vec::new()).unwrap();
            engine.create_rule("bench", &dest, bucket, agg).unwrap();
        }
    }
    engine
}

fn filled_engine(count: u64) -> Engine {
    let mut engine = engine_with_rules(false);
    for i in 0..count {
        engine.add_sample("bench", START + i, i as f64).unwrap();
    }
    engine
}

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");
    let count = 10_000u64;
    group.throughput(Throughput::Elements(count));

    for rules in [false, true] {
        let name = if rules { "with_compaction" } else { "plain" };
        group.bench_function(name, |b| {
            b.iter_batched(
                || engine_with_rules(rules),
                |mut engine| {
                    for i in 0..count {
                        engine
                            .add_sample("bench", black_box(START + i), black_box(i as f64))
                            .unwrap();
                    }
                    engine
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    let engine = filled_engine(100_000);

    for span in [100u64, 10_000, 100_000] {
        group.throughput(Throughput::Elements(span));
        group.bench_with_input(BenchmarkId::new("range", span), &span, |b, &span| {
            b.iter(|| {
                engine
                    .query("bench", START, START + span - 1)
                    .unwrap()
                    .count()
            })
        });
        group.bench_with_input(BenchmarkId::new("avg_60", span), &span, |b, &span| {
            b.iter(|| {
                engine
                    .query_aggregated("bench", START, START + span - 1, AggregationType::Avg, 60)
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    for size in [1_000u64, 100_000] {
        let engine = filled_engine(size);
        let series = engine.get("bench").unwrap();
        let encoded = encode_series(series);
        group.throughput(Throughput::Elements(size));

        group.bench_function(format!("encode_{}", size), |b| {
            b.iter(|| encode_series(black_box(series)))
        });
        group.bench_function(format!("decode_{}", size), |b| {
            b.iter(|| decode_series(black_box(&encoded), ReplayPolicy::Suppress).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ingest, bench_query, bench_codec);
criterion_main!(benches);

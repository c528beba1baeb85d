//! Encode/decode throughput benchmark for the archive write path.
//!
//! Covers the two record shapes the core pipeline handles:
//! - Text messages through the logtype encoder (C7), with a mix of
//!   repeated templates and distinct string/numeric variables.
//! - JSON records through the jsontype encoder (C6).
//!
//! Run: cargo bench --bench encode_throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use clparchive::config::EncoderConfig;
use clparchive::dictionary::logtype_dict::LogtypeDictionary;
use clparchive::dictionary::variable_dict::VariableDictionary;
use clparchive::json_codec::encode_json;
use clparchive::text_codec::encode_text;

fn text_messages(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("user bob-{} logged in from 10.0.0.{} after {}.5 seconds", i % 50, i % 256, i % 10))
        .collect()
}

fn json_records(n: usize) -> Vec<serde_json::Value> {
    (0..n)
        .map(|i| {
            serde_json::json!({
                "ts": 1_700_000_000 + i,
                "level": if i % 7 == 0 { "ERROR" } else { "INFO" },
                "msg": "request completed successfully",
                "latency_ms": (i % 500) as f64 + 0.5,
                "host": format!("server-{}", i % 20),
            })
        })
        .collect()
}

fn bench_text_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_encode");
    for &n in &[100usize, 1_000, 10_000] {
        let messages = text_messages(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &messages, |b, messages| {
            b.iter(|| {
                let config = EncoderConfig::default();
                let mut var_dict = VariableDictionary::new();
                let mut logtype_dict = LogtypeDictionary::new();
                for m in messages {
                    let encoded = encode_text(black_box(m), &config, &mut var_dict);
                    let num_vars = encoded.vars.len();
                    logtype_dict.insert_or_get(encoded.template, encoded.verbosity, num_vars);
                }
            });
        });
    }
    group.finish();
}

fn bench_json_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("json_encode");
    for &n in &[100usize, 1_000, 10_000] {
        let records = json_records(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &records, |b, records| {
            b.iter(|| {
                let config = EncoderConfig::default();
                let mut var_dict = VariableDictionary::new();
                let mut logtype_dict = LogtypeDictionary::new();
                for r in records {
                    black_box(encode_json(r.clone(), &config, &mut var_dict, &mut logtype_dict));
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_text_encode, bench_json_encode);
criterion_main!(benches);

//! # capgate Hot Path Benchmarks
//!
//! | Path | Runs on |
//! |------|---------|
//! | descriptor matching | every payload object of every query and stream |
//! | payload decode | every payload object delivered to a client |
//! | payload encode | every publish |
//! | key lookup | every request |

use api_gateway::{codec, Manifest, Registry};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use shared_bus::{Entity, LocalRouter, PayloadObject, PoMask, PoNum, STRUCTURED_MASK, TEXT_MASK};
use std::sync::Arc;

// ============================================================================
// Descriptors
// ============================================================================

fn bench_descriptor_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("descriptors");

    let ponums: Vec<PoNum> = (0..1000u32).map(|i| PoNum::new(i.wrapping_mul(0x0101_0101))).collect();
    group.throughput(Throughput::Elements(ponums.len() as u64));

    group.bench_function("mask_matches_1000", |b| {
        b.iter(|| {
            ponums
                .iter()
                .filter(|p| STRUCTURED_MASK.matches(**p))
                .count()
        })
    });

    group.bench_function("parse_mask", |b| {
        b.iter(|| PoMask::parse(black_box("64.0.1.0/24")).unwrap())
    });

    group.bench_function("parse_dot_form", |b| {
        b.iter(|| PoNum::from_dot_form(black_box("2.0.3.1")).unwrap())
    });

    group.finish();
}

// ============================================================================
// Payload codec
// ============================================================================

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let text = PayloadObject::new(TEXT_MASK.ponum(), "the quick brown fox".as_bytes().to_vec());
    group.bench_function("decode_text", |b| {
        b.iter(|| codec::decode(black_box(&text)).unwrap())
    });

    for fields in [4usize, 32, 256] {
        let value = json!((0..fields)
            .map(|i| (format!("field_{}", i), json!({"n": i, "tags": ["a", "b"]})))
            .collect::<serde_json::Map<_, _>>());
        let po = codec::encode(&STRUCTURED_MASK, &value).unwrap();

        group.bench_with_input(BenchmarkId::new("encode_msgpack", fields), &value, |b, v| {
            b.iter(|| codec::encode(&STRUCTURED_MASK, black_box(v)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("decode_msgpack", fields), &po, |b, po| {
            b.iter(|| codec::decode(black_box(po)).unwrap())
        });
    }

    group.finish();
}

// ============================================================================
// Registry
// ============================================================================

fn bench_registry_lookup(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let router = LocalRouter::new();

    let (registry, keys) = rt.block_on(async {
        let registry = Registry::open(dir.path(), false, Arc::new(router.agent()))
            .await
            .unwrap();
        let mut keys = Vec::new();
        for _ in 0..100 {
            let (key, _) = registry
                .register(&Entity::generate().to_material(), Manifest::all())
                .await
                .unwrap();
            keys.push(key);
        }
        (registry, keys)
    });

    let mut group = c.benchmark_group("registry");

    group.bench_function("get_permission", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % keys.len();
            registry.get_permission(black_box(&keys[i])).unwrap()
        })
    });

    group.bench_function("resolve", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % keys.len();
            registry.resolve(black_box(&keys[i])).unwrap()
        })
    });

    group.bench_function("unknown_key", |b| {
        b.iter(|| registry.get_permission(black_box("missing")).is_err())
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_descriptor_matching,
    bench_codec,
    bench_registry_lookup,
);

criterion_main!(benches);

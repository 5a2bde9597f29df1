//! Benchmarks for merging and ranking signing rates
//!
//! Runs once per ejector tick over every validator reported by every
//! protocol version.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ejector::chain::ValidatorId;
use ejector::signing_rate::{merge_signing_rates, ValidatorSigningRate};
use std::time::Duration;

fn test_validator(id: u16) -> ValidatorId {
    let mut bytes = [0u8; 32];
    bytes[..2].copy_from_slice(&id.to_be_bytes());
    ValidatorId::from_bytes(bytes)
}

/// One source's records for `size` validators, every `stride`-th a non-signer
fn create_source(size: u16, stride: u16, salt: u64) -> Vec<ValidatorSigningRate> {
    (0..size)
        .map(|i| {
            let non_signer = i % stride == 0;
            ValidatorSigningRate {
                validator_id: test_validator(i),
                signed_batches: if non_signer { 0 } else { 100 + salt },
                unsigned_batches: (i as u64 % 7) + salt,
                signed_bytes: if non_signer { 0 } else { 10_000 },
                unsigned_bytes: (i as u64 * 131 + salt) % 50_000,
                signing_latency: Duration::from_millis(i as u64 % 400),
            }
        })
        .collect()
}

fn benchmark_merge_two_sources(c: &mut Criterion) {
    let v1 = create_source(200, 10, 1);
    let v2 = create_source(200, 10, 2);

    c.bench_function("merge_signing_rates_200_validators", |b| {
        b.iter(|| merge_signing_rates(black_box(vec![v1.clone(), v2.clone()])));
    });
}

fn benchmark_merge_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_scaling");

    for size in [50u16, 200, 1000, 5000].iter() {
        let v1 = create_source(*size, 10, 1);
        let v2 = create_source(*size, 10, 2);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| merge_signing_rates(black_box(vec![v1.clone(), v2.clone()])));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_merge_two_sources, benchmark_merge_scaling);
criterion_main!(benches);

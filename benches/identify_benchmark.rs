use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::time::Duration;
use unicontact::test_support::{generate_observations, seed_store};
use unicontact::{PersistentStore, Store, Unicontact};

/// Stream identify calls against a fresh in-memory store.
fn benchmark_identify_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("identify_stream");
    group.sample_size(10);
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(10));

    // Test configurations: (request_count, overlap_probability)
    let test_configs = vec![
        (1_000, 0.01),  // mostly new identities
        (1_000, 0.30),  // frequent enrichment and merges
        (10_000, 0.10),
        (10_000, 0.50), // merge heavy
    ];

    for (request_count, overlap_prob) in test_configs {
        group.throughput(Throughput::Elements(request_count as u64));
        let observations = generate_observations(request_count, overlap_prob, 42);
        group.bench_with_input(
            BenchmarkId::new(
                "in_memory",
                format!(
                    "{}_requests_{}%_overlap",
                    request_count,
                    (overlap_prob * 100.0) as u32
                ),
            ),
            &observations,
            |b, observations| {
                b.iter_batched(
                    || (Unicontact::new(), observations.clone()),
                    |(mut engine, observations)| {
                        for (phone, email) in observations {
                            black_box(engine.identify(phone, email).unwrap());
                        }
                        engine.contact_count()
                    },
                    BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

/// Repeated lookups of known identities, the exact-match fast path.
fn benchmark_identify_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("identify_hit");
    let mut store = Store::new();
    let seeded = seed_store(&mut store, 3_000, 7).unwrap();
    let mut engine = Unicontact::with_store(store);
    let probe = seeded[0].clone();

    group.bench_function("seeded_3000", |b| {
        b.iter(|| {
            black_box(
                engine
                    .identify(probe.phone_number.clone(), probe.email.clone())
                    .unwrap(),
            )
        })
    });
    group.finish();
}

/// Identify calls committing through RocksDB.
fn benchmark_identify_persistent(c: &mut Criterion) {
    let mut group = c.benchmark_group("identify_persistent");
    group.sample_size(10);
    let observations = generate_observations(1_000, 0.2, 11);
    group.throughput(Throughput::Elements(observations.len() as u64));

    group.bench_function("rocksdb_1000_requests", |b| {
        b.iter_batched(
            || {
                let dir = tempfile::tempdir().unwrap();
                let store = PersistentStore::open(dir.path()).unwrap();
                (dir, Unicontact::with_store(store), observations.clone())
            },
            |(dir, mut engine, observations)| {
                for (phone, email) in observations {
                    black_box(engine.identify(phone, email).unwrap());
                }
                drop(engine);
                dir
            },
            BatchSize::PerIteration,
        )
    });
    group.finish();
}

criterion_group!(benches, benchmark_identify_stream, benchmark_identify_hit);
criterion_group! {
    name = persistent_benches;
    config = Criterion::default().without_plots();
    targets = benchmark_identify_persistent
}
criterion_main!(benches, persistent_benches);

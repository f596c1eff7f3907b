//! Experiment overhead benchmarks
//!
//! Toyota Way: Genchi Genbutsu (measure, don't guess)
//!
//! Measures what `Experiment::run` adds on top of the behaviors themselves:
//! the coin flip, two timed observations, comparison and publication.
//!
//! Run with: cargo bench --bench experiment_run

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use labcoat::analysis::{MemoryStore, MismatchStore, PredicateMatcher, Session};
use labcoat::experiment::{Experiment, MismatchRecord, NoopPublisher};

fn bench_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("experiment_run");

    group.bench_function("control_only", |b| {
        b.iter(|| Experiment::new("bench", || Ok::<_, String>(black_box(42))).run());
    });

    group.bench_function("matching_candidate", |b| {
        b.iter(|| {
            let mut experiment = Experiment::new("bench", || Ok::<_, String>(black_box(42)));
            experiment
                .candidate(|| Ok(black_box(42)))
                .publisher(Arc::new(NoopPublisher));
            experiment.run()
        });
    });

    let store = Arc::new(MemoryStore::<MismatchRecord>::new());
    group.bench_function("mismatch_into_store", |b| {
        b.iter(|| {
            let mut experiment = Experiment::new("bench", || Ok::<_, String>(black_box(1)));
            experiment
                .candidate(|| Ok(black_box(2)))
                .add_context("login", "hubot")
                .publisher(store.clone());
            experiment.run()
        });
        store.clear();
    });

    group.finish();
}

fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_analyze");

    for size in [100usize, 1_000] {
        group.bench_with_input(BenchmarkId::new("all_identified", size), &size, |b, &size| {
            b.iter(|| {
                let store: MemoryStore<String> = (0..size).map(|i| format!("known-{i}")).collect();
                let mut session = Session::builder("bench")
                    .store(store)
                    .output(std::io::sink())
                    .build()
                    .unwrap();
                session.add(PredicateMatcher::new("known", |f| {
                    f.record().as_str().is_some_and(|s| s.starts_with("known-"))
                }));
                let pending = session.analyze().unwrap();
                black_box((pending, session.store().count().unwrap()))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_run, bench_analyze);
criterion_main!(benches);

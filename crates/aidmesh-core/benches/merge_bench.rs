//! Benchmarks for the dedup & merge engine
//!
//! Run with: cargo bench -p aidmesh-core
//!
//! These benchmarks establish performance baselines for:
//! - Duplicate detection against candidate sets
//! - Status-history merging
//! - Status resolution over merged histories

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use aidmesh_core::merge::{is_duplicate, merge_history, merge_submission, resolve_status};
use aidmesh_core::{
    Location, NewReport, Report, ReportStatus, ReportType, StatusEvent, SyncConfig, UserId,
};

fn payload(user: &str, ts: i64) -> NewReport {
    let mut p = NewReport::new(
        UserId::new(user),
        ReportType::Fire,
        Location::new(37.7749, -122.4194, "pier 7"),
        "smoke",
    );
    p.created_at = ts;
    p
}

fn history(len: usize) -> Vec<StatusEvent> {
    let statuses = [
        ReportStatus::Reported,
        ReportStatus::Acknowledged,
        ReportStatus::Responding,
        ReportStatus::Resolved,
    ];
    (0..len)
        .map(|i| {
            StatusEvent::new(
                statuses[i % statuses.len()],
                UserId::new(format!("user{}", i)),
                1_000_000 + i as i64 * 1_000,
            )
        })
        .collect()
}

fn bench_is_duplicate(c: &mut Criterion) {
    let config = SyncConfig::default();
    let existing = Report::from_submission(&payload("u1", 1_000_000));
    let candidate = payload("u1", 1_010_000);

    c.bench_function("is_duplicate_match", |b| {
        b.iter(|| black_box(is_duplicate(&existing, &candidate, &config)))
    });

    let miss = payload("u2", 1_010_000);
    c.bench_function("is_duplicate_miss", |b| {
        b.iter(|| black_box(is_duplicate(&existing, &miss, &config)))
    });
}

fn bench_merge_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_history");

    for size in [4usize, 32, 128] {
        let base = history(size);
        let incoming = history(size / 2);
        group.bench_function(format!("{}_events", size), |b| {
            b.iter_batched(
                || base.clone(),
                |mut h| black_box(merge_history(&mut h, &incoming)),
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_merge_submission(c: &mut Criterion) {
    let existing = Report::from_submission(&payload("u1", 1_000_000));
    let mut replay = payload("u1", 1_010_000);
    replay.seed_history = history(8);

    c.bench_function("merge_submission_with_seed_history", |b| {
        b.iter(|| black_box(merge_submission(&existing, &replay)))
    });
}

fn bench_resolve_status(c: &mut Criterion) {
    let long = history(256);
    c.bench_function("resolve_status_256_events", |b| {
        b.iter(|| black_box(resolve_status(&long)))
    });
}

criterion_group!(
    benches,
    bench_is_duplicate,
    bench_merge_history,
    bench_merge_submission,
    bench_resolve_status
);
criterion_main!(benches);
